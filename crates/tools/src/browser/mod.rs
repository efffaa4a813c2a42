pub mod cdp;
pub mod manager;
pub mod page;
