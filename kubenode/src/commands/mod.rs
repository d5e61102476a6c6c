pub mod bootstrap;
pub mod check;
pub mod health;
pub mod reset;
pub mod token;
