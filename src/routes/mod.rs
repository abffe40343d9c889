//! Route modules for the EDPS mock server

pub mod analysisjob;
pub mod daseen;
pub mod files;
pub mod health;
pub mod upload;
