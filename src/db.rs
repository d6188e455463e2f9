pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::pool::{Database, SqlValue, Statement};
pub use self::stores::{
    BudgetStore, FamilyStore, GoalStore, NotificationStore, ReferenceStore, TransactionStore,
    UserStore,
};
pub use self::translate::Dialect;

pub mod error;
pub mod manager;
mod migrations;
pub mod models;
pub mod pool;
pub mod stores;
pub mod translate;
