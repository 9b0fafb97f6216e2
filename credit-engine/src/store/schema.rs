//! Relational schema
//!
//! # Tables
//!
//! - `consumers` - consumer aggregate, `national_id` unique
//! - `credit_sub_limits` - one row per (consumer, tenor), enforced by a
//!   uniqueness constraint
//! - `transactions` - approved loans, `contract_number` unique
//!
//! Statements are idempotent so they can run on every start.

/// DDL statements, in dependency order
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS consumers (
        id                   BIGSERIAL PRIMARY KEY,
        national_id          VARCHAR(16)   NOT NULL UNIQUE,
        full_name            VARCHAR(255)  NOT NULL,
        legal_name           VARCHAR(255)  NOT NULL DEFAULT '',
        birth_place          VARCHAR(100)  NOT NULL DEFAULT '',
        birth_date           DATE,
        salary               NUMERIC(19,2) NOT NULL DEFAULT 0,
        overall_credit_limit NUMERIC(19,2) NOT NULL DEFAULT 0 CHECK (overall_credit_limit >= 0),
        created_at           TIMESTAMPTZ   NOT NULL DEFAULT NOW(),
        updated_at           TIMESTAMPTZ   NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS credit_sub_limits (
        id           BIGSERIAL PRIMARY KEY,
        consumer_id  BIGINT        NOT NULL REFERENCES consumers (id) ON DELETE CASCADE,
        tenor_months INTEGER       NOT NULL CHECK (tenor_months IN (1, 2, 3, 6)),
        limit_amount NUMERIC(19,2) NOT NULL CHECK (limit_amount >= 0),
        created_at   TIMESTAMPTZ   NOT NULL DEFAULT NOW(),
        UNIQUE (consumer_id, tenor_months)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id                BIGSERIAL PRIMARY KEY,
        consumer_id       BIGINT        NOT NULL REFERENCES consumers (id) ON DELETE RESTRICT,
        sub_limit_id      BIGINT        NOT NULL REFERENCES credit_sub_limits (id) ON DELETE RESTRICT,
        contract_number   VARCHAR(50)   NOT NULL UNIQUE,
        contract_date     TIMESTAMPTZ   NOT NULL,
        otr               NUMERIC(19,2) NOT NULL,
        down_payment      NUMERIC(19,2) NOT NULL DEFAULT 0,
        admin_fee         NUMERIC(19,2) NOT NULL DEFAULT 0,
        principal         NUMERIC(19,2) NOT NULL,
        interest          NUMERIC(19,2) NOT NULL,
        installment_value NUMERIC(19,2) NOT NULL,
        tenor_months      INTEGER       NOT NULL,
        asset_name        VARCHAR(255)  NOT NULL,
        asset_type        VARCHAR(50)   NOT NULL,
        source            VARCHAR(50)   NOT NULL,
        status            VARCHAR(30)   NOT NULL,
        notes             TEXT          NOT NULL DEFAULT '',
        created_at        TIMESTAMPTZ   NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_transactions_consumer_status
        ON transactions (consumer_id, status)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_transactions_consumer_contract_date
        ON transactions (consumer_id, contract_date DESC)
    "#,
];
