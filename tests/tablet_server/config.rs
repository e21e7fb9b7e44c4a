//! Loading the server configuration from disk

use tablet::{ServerError, TabletServer, TxPoolConfig};
use tempfile::TempDir;

#[test]
fn config_file_drives_pool() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(tablet::CONFIG_FILE_NAME);
    std::fs::write(&path, "name = \"FilePool\"\ncapacity = 3\nidle_timeout_ms = 0\n").unwrap();

    let server = TabletServer::builder()
        .config_file(&path)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(server.tx_pool().name(), "FilePool");

    let db = crate::scripted_db();
    server.open(db.connector()).unwrap();
    assert_eq!(server.tx_pool().capacity(), 3);
    server.shutdown();
}

#[test]
fn default_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("txpool.toml");
    TxPoolConfig::write_default_if_missing(&path).unwrap();

    let server = TabletServer::builder().config_file(&path).unwrap().build().unwrap();
    assert_eq!(server.tx_pool().name(), "TransactionPool");
}

#[test]
fn invalid_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("txpool.toml");
    std::fs::write(&path, "capacity = 0\n").unwrap();

    let err = TabletServer::builder().config_file(&path).err().unwrap();
    assert!(matches!(err, ServerError::Config(_)));
}
