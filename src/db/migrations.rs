// Schema per backend. Dates are stored as `YYYY-MM-DD` text and timestamps
// as RFC 3339 UTC text on every backend so the same queries and row types
// work everywhere.

pub(super) fn postgres() -> Vec<&'static str> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_settings (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            currency TEXT NOT NULL,
            language TEXT NOT NULL,
            rate_provider TEXT NOT NULL,
            theme TEXT NOT NULL,
            notifications_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            amount DOUBLE PRECISION NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            occurred_on TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_limits (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            monthly_limit DOUBLE PRECISION NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, category)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_history (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            month TEXT NOT NULL,
            category TEXT NOT NULL,
            limit_amount DOUBLE PRECISION NOT NULL,
            spent DOUBLE PRECISION NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, month, category)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            target_amount DOUBLE PRECISION NOT NULL,
            current_amount DOUBLE PRECISION NOT NULL DEFAULT 0,
            deadline TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goal_transactions (
            id TEXT PRIMARY KEY,
            goal_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            amount DOUBLE PRECISION NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS family_members (
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (family_id, user_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            endpoint TEXT NOT NULL UNIQUE,
            p256dh TEXT NOT NULL,
            auth_key TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            language TEXT NOT NULL,
            msg_key TEXT NOT NULL,
            msg_value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (language, msg_key)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            provider TEXT NOT NULL,
            currency TEXT NOT NULL,
            rate DOUBLE PRECISION NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY (provider, currency)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, occurred_on)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_category ON transactions(user_id, category)",
        "CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_goal_transactions_goal ON goal_transactions(goal_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read)",
    ]
}

pub(super) fn sqlite() -> Vec<&'static str> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_settings (
            user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            currency TEXT NOT NULL,
            language TEXT NOT NULL,
            rate_provider TEXT NOT NULL,
            theme TEXT NOT NULL,
            notifications_enabled INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            occurred_on TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_limits (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            monthly_limit REAL NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, category)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_history (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            month TEXT NOT NULL,
            category TEXT NOT NULL,
            limit_amount REAL NOT NULL,
            spent REAL NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, month, category)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            target_amount REAL NOT NULL,
            current_amount REAL NOT NULL DEFAULT 0,
            deadline TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goal_transactions (
            id TEXT PRIMARY KEY,
            goal_id TEXT NOT NULL REFERENCES goals(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            amount REAL NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS families (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS family_members (
            family_id TEXT NOT NULL REFERENCES families(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (family_id, user_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            endpoint TEXT NOT NULL UNIQUE,
            p256dh TEXT NOT NULL,
            auth_key TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            language TEXT NOT NULL,
            msg_key TEXT NOT NULL,
            msg_value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (language, msg_key)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            provider TEXT NOT NULL,
            currency TEXT NOT NULL,
            rate REAL NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY (provider, currency)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, occurred_on)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_category ON transactions(user_id, category)",
        "CREATE INDEX IF NOT EXISTS idx_goals_user ON goals(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_goal_transactions_goal ON goal_transactions(goal_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read)",
    ]
}

// MySQL has no `CREATE INDEX IF NOT EXISTS`, so indexes are declared inline.
pub(super) fn mysql() -> Vec<&'static str> {
    vec![
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id VARCHAR(64) PRIMARY KEY,
            email VARCHAR(255) NOT NULL UNIQUE,
            name VARCHAR(255) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            updated_at VARCHAR(32) NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            expires_at VARCHAR(32) NOT NULL,
            INDEX idx_sessions_user (user_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS user_settings (
            user_id VARCHAR(64) PRIMARY KEY,
            currency VARCHAR(8) NOT NULL,
            language VARCHAR(16) NOT NULL,
            rate_provider VARCHAR(32) NOT NULL,
            theme VARCHAR(32) NOT NULL,
            notifications_enabled BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at VARCHAR(32) NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            kind VARCHAR(16) NOT NULL,
            amount DOUBLE NOT NULL,
            category VARCHAR(128) NOT NULL,
            description TEXT NOT NULL,
            occurred_on VARCHAR(10) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            updated_at VARCHAR(32) NOT NULL,
            INDEX idx_transactions_user_date (user_id, occurred_on),
            INDEX idx_transactions_user_category (user_id, category),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_limits (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            category VARCHAR(128) NOT NULL,
            monthly_limit DOUBLE NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            updated_at VARCHAR(32) NOT NULL,
            UNIQUE KEY uq_budget_limits (user_id, category),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS budget_history (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            month VARCHAR(7) NOT NULL,
            category VARCHAR(128) NOT NULL,
            limit_amount DOUBLE NOT NULL,
            spent DOUBLE NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            UNIQUE KEY uq_budget_history (user_id, month, category),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goals (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            name VARCHAR(255) NOT NULL,
            target_amount DOUBLE NOT NULL,
            current_amount DOUBLE NOT NULL DEFAULT 0,
            deadline VARCHAR(10),
            status VARCHAR(16) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            updated_at VARCHAR(32) NOT NULL,
            INDEX idx_goals_user (user_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS goal_transactions (
            id VARCHAR(64) PRIMARY KEY,
            goal_id VARCHAR(64) NOT NULL,
            user_id VARCHAR(64) NOT NULL,
            kind VARCHAR(16) NOT NULL,
            amount DOUBLE NOT NULL,
            note TEXT NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            INDEX idx_goal_transactions_goal (goal_id),
            FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS families (
            id VARCHAR(64) PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            owner_id VARCHAR(64) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS family_members (
            family_id VARCHAR(64) NOT NULL,
            user_id VARCHAR(64) NOT NULL UNIQUE,
            role VARCHAR(16) NOT NULL,
            joined_at VARCHAR(32) NOT NULL,
            PRIMARY KEY (family_id, user_id),
            FOREIGN KEY (family_id) REFERENCES families(id) ON DELETE CASCADE,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            kind VARCHAR(32) NOT NULL,
            title VARCHAR(255) NOT NULL,
            message TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            created_at VARCHAR(32) NOT NULL,
            INDEX idx_notifications_user (user_id, is_read),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id VARCHAR(64) PRIMARY KEY,
            user_id VARCHAR(64) NOT NULL,
            endpoint VARCHAR(500) NOT NULL UNIQUE,
            p256dh VARCHAR(255) NOT NULL,
            auth_key VARCHAR(255) NOT NULL,
            created_at VARCHAR(32) NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS translations (
            language VARCHAR(16) NOT NULL,
            msg_key VARCHAR(191) NOT NULL,
            msg_value TEXT NOT NULL,
            updated_at VARCHAR(32) NOT NULL,
            PRIMARY KEY (language, msg_key)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            provider VARCHAR(32) NOT NULL,
            currency VARCHAR(8) NOT NULL,
            rate DOUBLE NOT NULL,
            fetched_at VARCHAR(32) NOT NULL,
            PRIMARY KEY (provider, currency)
        )
        "#,
    ]
}
