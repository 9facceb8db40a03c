pub mod jvm_flags;
pub mod launcher;
