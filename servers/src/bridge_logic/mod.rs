pub mod serve;
pub mod state;
