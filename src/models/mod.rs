pub mod player_lists;
pub mod server_record;
