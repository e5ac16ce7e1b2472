pub mod app_config;
pub mod database;
pub mod events;
pub mod idempotency;
pub mod ledger_repo;
pub mod order_repo;
pub mod payment_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use idempotency::RedisClient;
pub use ledger_repo::PgVendorLedgerRepository;
pub use order_repo::PgOrderRepository;
pub use payment_repo::PgPaymentRepository;
