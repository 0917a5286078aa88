pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("clickhouse transport error: {0}")]
    Transport(#[from] wreq::Error),
    #[error("clickhouse returned status {status}: {message}")]
    Query { status: u16, message: String },
    #[error("failed to decode clickhouse row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to format query parameter: {0}")]
    Format(#[from] time::error::Format),
    #[error("timestamp out of range: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
    #[error("invalid store config: {0}")]
    Config(String),
}
