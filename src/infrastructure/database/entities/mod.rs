//! SeaORM entities

pub mod boot_notification;
pub mod meter_reading;
pub mod transaction;

pub use boot_notification::Entity as BootNotification;
pub use meter_reading::Entity as MeterReading;
pub use transaction::Entity as Transaction;
