use sql_adapter::native::memory::MemoryDriver;
use sql_adapter::prelude::*;

fn escaping_connection(backend: &str) -> Connection {
    let params = ConnectionParameters::new()
        .with_driver(backend)
        .with_database("app");
    Connection::with_native(
        params,
        Box::new(MemoryDriver::new(backend).with_native_escaping()),
    )
}

#[test]
fn mysql_identifier_chain_doubles_backticks() {
    let platform = Platform::for_backend(&Backend::Mysql);
    assert_eq!(platform.quote_identifier_chain(["a`b", "c"]), "`a``b`.`c`");
    assert_eq!(platform.name(), "MySQL");
}

#[test]
fn sql_server_fragments_keep_structure() {
    let platform = Platform::new(Dialect::SqlServer);
    assert_eq!(
        platform.quote_identifier_in_fragment("dbo.orders as o", &[]),
        "[dbo].[orders] as [o]"
    );
    assert_eq!(
        platform.quote_identifier_in_fragment("MAX(o.total)", &["max"]),
        "MAX([o].[total])"
    );
}

#[test]
fn live_connection_quoting_is_identical_for_trusted_values() -> Result<(), SqlAdapterError> {
    let mut conn = escaping_connection("sqlite");
    conn.connect()?;
    let platform = Platform::for_backend(&Backend::Sqlite).with_connection(&conn);

    for value in ["plain", "it's", "two '' quotes", "back\\slash"] {
        assert_eq!(
            platform.quote_value(value),
            platform.quote_trusted_value(value)
        );
    }
    assert_eq!(platform.quote_value("it's"), "'it''s'");
    assert_eq!(platform.quote_value_list(["a", "b'c"]), "'a', 'b''c'");
    assert_eq!(
        platform.quote_identifier_chain(["main", "t"]),
        "\"main\".\"t\""
    );
    Ok(())
}

#[test]
fn unconnected_quoting_falls_back_to_backslashes() {
    let conn = escaping_connection("pgsql");
    let platform = Platform::for_backend(&Backend::Pgsql).with_connection(&conn);
    assert_eq!(platform.quote_value("it's"), r"'it\'s'");
    assert_eq!(
        platform.quote_trusted_value("line\nbreak"),
        r"'line\nbreak'"
    );
}

#[test]
fn driver_quoting_follows_the_connected_backend() -> Result<(), SqlAdapterError> {
    let params = ConnectionParameters::new()
        .with_driver("sqlsrv")
        .with_host("db.local")
        .with_database("app");
    let mut driver = Driver::with_native(
        params,
        Box::new(MemoryDriver::new("sqlsrv").with_native_escaping()),
    );
    assert_eq!(
        driver.quote_identifier_chain(["dbo", "a]b"]),
        "[dbo].[a]]b]"
    );

    driver.query("SELECT 1")?;
    assert_eq!(driver.quote_value("O'Neil"), "'O''Neil'");
    assert_eq!(driver.format_parameter_name(Some("id"), 3), "@P3");
    assert_eq!(
        driver.database_platform_name(NameFormat::Natural),
        "SQL Server"
    );
    assert_eq!(
        driver.database_platform_name(NameFormat::Camelcase),
        "SQLServer"
    );
    Ok(())
}
