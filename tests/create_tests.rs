use entgraph::core::{DbError, EntError, Result, is_constraint_error, is_validation_error};
use entgraph::schema::validate_id;
use entgraph::{Client, Config, Dialect, Id, MemoryDriver, Value};
use std::sync::Arc;
use std::time::Duration;

async fn setup(dialect: Dialect) -> Result<(Arc<MemoryDriver>, Client)> {
    let driver = Arc::new(MemoryDriver::new(dialect));
    let client = Client::new(Config::new(driver.clone()));
    client.schema_create().await?;
    Ok((driver, client))
}

#[tokio::test]
async fn test_default_id_is_generated() -> Result<()> {
    let (driver, client) = setup(Dialect::Postgres).await?;

    let session = client.session().create().save().await?;
    assert!(!session.id.is_nil());
    assert!(validate_id(session.id.as_bytes()).is_ok());

    let rows = driver.rows("sessions").await.map_err(EntError::Db)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], Value::from(session.id));

    // Every save draws a fresh ID.
    let other = client.session().create().save().await?;
    assert_ne!(session.id, other.id);
    Ok(())
}

#[tokio::test]
async fn test_explicit_id_is_kept() -> Result<()> {
    let (_driver, client) = setup(Dialect::Sqlite).await?;
    let id: Id = "6f1c2d3e-4b5a-4c6d-8e7f-0a1b2c3d4e5f".parse().unwrap();

    let session = client.session().create().set_id(id).save().await?;
    assert_eq!(session.id, id);

    let session = client.session().create().set_nillable_id(None).save().await?;
    assert_ne!(session.id, id);
    Ok(())
}

#[tokio::test]
async fn test_invalid_id_never_reaches_the_driver() -> Result<()> {
    let (driver, client) = setup(Dialect::Postgres).await?;

    let err = client.session().create().set_id(Id::NIL).save().await.unwrap_err();
    assert!(is_validation_error(&err));
    assert!(!is_constraint_error(&err));
    match &err {
        EntError::Validation(validation) => {
            assert_eq!(validation.entity, "Session");
            assert_eq!(validation.name, "id");
        }
        other => panic!("Expected validation error, got {:?}", other),
    }

    assert!(driver.history().await.is_empty());
    assert_eq!(driver.row_count("sessions").await.map_err(EntError::Db)?, 0);
    Ok(())
}

#[tokio::test]
async fn test_edges_are_stored_as_foreign_keys() -> Result<()> {
    let (driver, client) = setup(Dialect::Postgres).await?;

    let device = client.device().create().save().await?;
    let parent = client.session().create().set_device(&device).save().await?;
    let child = client
        .session()
        .create()
        .set_nillable_device_id(Some(device.id))
        .set_parent(&parent)
        .save()
        .await?;

    assert_eq!(parent.device_id(), Some(device.id));
    assert_eq!(parent.parent_id(), None);
    assert_eq!(child.parent_id(), Some(parent.id));

    let insert = driver.history().await.pop().unwrap();
    assert_eq!(insert.columns, vec!["id", "device_sessions", "session_children"]);
    assert_eq!(insert.returning.as_deref(), Some("id"));
    Ok(())
}

#[tokio::test]
async fn test_constraint_errors_are_classified() -> Result<()> {
    let (_driver, client) = setup(Dialect::Sqlite).await?;

    // Missing device.
    let err = client
        .session()
        .create()
        .set_device_id(entgraph::schema::new_id())
        .save()
        .await
        .unwrap_err();
    assert!(is_constraint_error(&err));

    // Duplicate primary key without a conflict policy.
    let session = client.session().create().save().await?;
    let err = client.session().create().set_id(session.id).exec().await.unwrap_err();
    assert!(is_constraint_error(&err));
    assert!(err.to_string().contains("constraint failed"));
    Ok(())
}

#[tokio::test]
async fn test_other_executor_errors_are_not_constraint_errors() {
    // No schema installed.
    let client = Client::new(Config::memory(Dialect::Postgres));
    let err = client.session().create().save().await.unwrap_err();
    assert!(!is_constraint_error(&err));
    assert!(matches!(err, EntError::Db(DbError::TableNotFound(_))));
}

#[tokio::test]
async fn test_mysql_create_without_returning() -> Result<()> {
    let (driver, client) = setup(Dialect::MySql).await?;
    let id = entgraph::schema::new_id();

    let session = client.session().create().set_id(id).save().await?;
    assert_eq!(session.id, id);

    let insert = driver.history().await.pop().unwrap();
    assert!(insert.returning.is_none());
    let (sql, args) = insert.render(Dialect::MySql);
    assert_eq!(sql, "INSERT INTO `sessions` (`id`) VALUES (?)");
    assert_eq!(args, vec![Value::from(id)]);
    Ok(())
}

#[tokio::test]
async fn test_debug_and_timeout_config() -> Result<()> {
    let driver = Arc::new(MemoryDriver::new(Dialect::Postgres));
    let config = Config::new(driver.clone())
        .debug()
        .query_timeout(Duration::from_secs(5));
    assert!(config.validate().is_ok());

    let client = Client::new(config);
    client.schema_create().await?;
    client.session().create().exec().await?;
    assert_eq!(driver.history().await.len(), 1);
    Ok(())
}
