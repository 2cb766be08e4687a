pub mod client;
pub mod poll;
pub mod providers;
