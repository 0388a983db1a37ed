pub mod db;

pub use blood_alert_core::memory::InMemoryDatabase;
pub use db::DbAdapter;
