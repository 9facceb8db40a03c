use std::path::Path;

use log::info;

use crate::error::Result;

/// Rewrites the refusal flag in `eula.txt` to acceptance. The file is
/// generated by the server's first run, so only the flag itself changes.
pub async fn sign_eula(eula_path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(eula_path).await?;
    let signed = text.replacen("eula=false", "eula=true", 1);
    tokio::fs::write(eula_path, signed).await?;
    info!("signed {}", eula_path.display());
    Ok(())
}

/// Checks whether `eula.txt` carries the acceptance flag. Missing file
/// counts as unsigned.
pub async fn is_signed(eula_path: &Path) -> Result<bool> {
    if !eula_path.exists() {
        return Ok(false);
    }
    let text = tokio::fs::read_to_string(eula_path).await?;
    Ok(text
        .lines()
        .map(str::trim)
        .any(|line| line == "eula=true"))
}
