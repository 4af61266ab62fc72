// SQLite backend over rusqlite
//
// - params: conversion from `RowValues` to rusqlite values
// - query: value extraction and statement materialization
// - session: the native driver, session and prepared statement

pub mod params;
pub mod query;
pub mod session;

pub use session::SqliteDriver;
