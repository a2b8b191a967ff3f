pub mod inspect;
pub mod scrape;

pub use inspect::{history, status, violations};
pub use scrape::{backfill, refresh, run};
