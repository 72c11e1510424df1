pub mod asbis;
pub mod catalog;
pub mod db;
