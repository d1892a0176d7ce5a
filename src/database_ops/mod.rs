pub mod db;
pub mod shows;
