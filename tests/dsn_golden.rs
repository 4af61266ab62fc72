use serde_json::json;
use sql_adapter::prelude::*;

fn dsn_for(value: serde_json::Value) -> Result<String, SqlAdapterError> {
    let params = ConnectionParameters::from_value(value)?;
    Ok(Dsn::from_parameters(&params)?.to_string())
}

#[test]
fn golden_connection_strings() -> Result<(), SqlAdapterError> {
    let cases = [
        (
            json!({"driver": "sqlite", "database": "/srv/app.db"}),
            "sqlite:/srv/app.db",
        ),
        (
            json!({
                "driver": "Pdo_Mysql",
                "hostname": "db",
                "dbname": "shop",
                "port": 3306,
                "charset": "utf8mb4"
            }),
            "mysql:dbname=shop;host=db;port=3306;charset=utf8mb4",
        ),
        (
            json!({
                "pdodriver": "pgsql",
                "host": "db",
                "database": "shop",
                "port": "5432",
                "charset": "utf8"
            }),
            "pgsql:dbname=shop;host=db;port=5432",
        ),
        (
            json!({"driver": "sqlsrv", "host": "db\\SQLEXPRESS", "database": "shop", "port": 1433}),
            "sqlsrv:database=shop;server=db\\SQLEXPRESS",
        ),
        (
            json!({"driver": "dblib", "host": "db", "dbname": "shop", "version": "7.4"}),
            "dblib:dbname=shop;host=db;version=7.4",
        ),
        (
            json!({"driver": "mysql", "unix_socket": "/run/mysqld.sock", "dbname": "shop"}),
            "mysql:dbname=shop;unix_socket=/run/mysqld.sock",
        ),
        (
            json!({"driver": "mysql", "dsn": "pgsql:host=other;dbname=x", "host": "ignored"}),
            "pgsql:host=other;dbname=x",
        ),
    ];

    for (input, expected) in cases {
        assert_eq!(dsn_for(input.clone())?, expected, "input {input}");
        assert_eq!(dsn_for(input)?, expected, "not deterministic");
    }
    Ok(())
}

#[test]
fn credentials_never_reach_the_connection_string() -> Result<(), SqlAdapterError> {
    let dsn = dsn_for(json!({
        "driver": "pgsql",
        "host": "db",
        "dbname": "shop",
        "username": "app",
        "password": "hunter2"
    }))?;
    assert!(!dsn.contains("hunter2"));
    assert!(!dsn.contains("app;"));
    Ok(())
}

#[test]
fn unusable_parameters_are_rejected() {
    for input in [
        json!({"host": "db", "dbname": "shop"}),
        json!({"driver": "mysql", "host": "db", "unix_socket": "/tmp/mysql.sock"}),
    ] {
        assert!(matches!(
            dsn_for(input),
            Err(SqlAdapterError::InvalidConnectionParameters(_))
        ));
    }
    assert!(matches!(
        dsn_for(json!("sqlite:app.db")),
        Err(SqlAdapterError::InvalidArgument(_))
    ));
}
