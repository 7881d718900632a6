#![allow(dead_code)]

use nestorm::{Bindings, Dialect, Driver, DriverFailure, Execution, Row, SqliteDriver};
use std::cell::RefCell;

pub const SCHEMA: &str = "
CREATE TABLE countries (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    first TEXT NOT NULL,
    last TEXT,
    email TEXT,
    age INTEGER NOT NULL
);
CREATE TABLE profiles (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    country_id INTEGER REFERENCES countries(id),
    bio TEXT
);
CREATE TABLE posts (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    title TEXT NOT NULL,
    published INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY,
    post_id INTEGER NOT NULL REFERENCES posts(id),
    body TEXT NOT NULL
);
CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL);
CREATE TABLE tags_users (
    user_id INTEGER NOT NULL REFERENCES users(id),
    tag_id INTEGER NOT NULL REFERENCES tags(id)
);

INSERT INTO countries (id, name) VALUES (1, 'New Zealand'), (2, 'Chile');
INSERT INTO users (id, first, last, email, age) VALUES
    (1, 'Ada', 'Lovelace', 'ada@example.com', 36),
    (2, 'Alan', 'Turing', 'alan@example.com', 41),
    (3, 'Grace', 'Hopper', NULL, 85),
    (4, 'Linus', NULL, 'linus@example.com', 17);
INSERT INTO profiles (id, user_id, country_id, bio) VALUES
    (10, 1, 1, 'analyst'),
    (11, 2, NULL, 'logician');
INSERT INTO posts (id, user_id, title, published) VALUES
    (100, 1, 'Notes on the engine', 1),
    (101, 1, 'Bernoulli numbers', 1),
    (102, 2, 'Computable numbers', 1),
    (103, 2, 'Draft', 0);
INSERT INTO comments (id, post_id, body) VALUES
    (1000, 100, 'first'),
    (1001, 100, 'second'),
    (1002, 102, 'halting');
INSERT INTO tags (id, label) VALUES (1, 'math'), (2, 'computing');
INSERT INTO tags_users (user_id, tag_id) VALUES (1, 1), (1, 2), (2, 2);
";

/// In-memory SQLite driver that records every statement it runs.
pub struct RecordingDriver {
    inner: SqliteDriver,
    statements: RefCell<Vec<String>>,
}

impl RecordingDriver {
    pub fn seeded() -> Self {
        let inner = SqliteDriver::memory().expect("open in-memory database");
        inner.execute_batch(SCHEMA).expect("seed schema");
        Self {
            inner,
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn clear(&self) {
        self.statements.borrow_mut().clear();
    }
}

impl Driver for RecordingDriver {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn fetch(&self, sql: &str, params: &Bindings) -> Result<Vec<Row>, DriverFailure> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.fetch(sql, params)
    }

    fn execute(&self, sql: &str, params: &Bindings) -> Result<Execution, DriverFailure> {
        self.statements.borrow_mut().push(sql.to_string());
        self.inner.execute(sql, params)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, DriverFailure> {
        self.inner.columns(table)
    }
}

/// Install a `tracing` subscriber once so `RUST_LOG=nestorm=debug` shows statements.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
