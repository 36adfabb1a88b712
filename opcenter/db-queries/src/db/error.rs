// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling and conversions.

use diesel::result::DatabaseErrorInformation;
use diesel::result::DatabaseErrorKind as DieselErrorKind;
use diesel::result::Error as DieselError;
use opcenter_common::api::external::{
    Error as PublicError, LookupType, ResourceType,
};

/// Summarizes details provided with a database error.
fn format_database_error(
    kind: DieselErrorKind,
    info: &dyn DatabaseErrorInformation,
) -> String {
    let mut rv =
        format!("database error (kind = {:?}): {}\n", kind, info.message());
    if let Some(details) = info.details() {
        rv.push_str(&format!("DETAILS: {}\n", details));
    }
    if let Some(hint) = info.hint() {
        rv.push_str(&format!("HINT: {}\n", hint));
    }
    if let Some(table_name) = info.table_name() {
        rv.push_str(&format!("TABLE NAME: {}\n", table_name));
    }
    if let Some(column_name) = info.column_name() {
        rv.push_str(&format!("COLUMN NAME: {}\n", column_name));
    }
    if let Some(constraint_name) = info.constraint_name() {
        rv.push_str(&format!("CONSTRAINT NAME: {}\n", constraint_name));
    }
    rv
}

/// Describes how a caller wants a database error to be reported
pub enum ErrorHandler<'a> {
    /// The operation looked up an object: `NotFound` means that object does
    /// not exist.
    NotFoundByLookup(ResourceType, LookupType),
    /// The operation created or renamed an object: a uniqueness violation
    /// means the name is taken.
    Conflict(ResourceType, &'a str),
    /// Any error is the server's problem.
    Server,
}

/// Converts a Diesel error to an external error.
pub fn public_error_from_diesel(
    error: DieselError,
    handler: ErrorHandler<'_>,
) -> PublicError {
    match (error, handler) {
        (
            DieselError::NotFound,
            ErrorHandler::NotFoundByLookup(type_name, lookup_type),
        ) => PublicError::ObjectNotFound { type_name, lookup_type },
        (
            DieselError::DatabaseError(DieselErrorKind::UniqueViolation, _),
            ErrorHandler::Conflict(type_name, object_name),
        ) => PublicError::ObjectAlreadyExists {
            type_name,
            object_name: object_name.to_string(),
        },
        (
            DieselError::DatabaseError(
                kind @ DieselErrorKind::ForeignKeyViolation,
                info,
            ),
            _,
        ) => PublicError::conflict(&format_database_error(kind, &*info)),
        (DieselError::DatabaseError(kind, info), _)
            if is_busy(info.message()) =>
        {
            PublicError::unavail(&format_database_error(kind, &*info))
        }
        (DieselError::DatabaseError(kind, info), _) => {
            PublicError::internal_error(&format_database_error(kind, &*info))
        }
        (error, _) => PublicError::internal_error(&format!(
            "Unknown diesel error: {:?}",
            error
        )),
    }
}

// SQLite reports contention on the database file through these messages
// rather than a dedicated error kind.
fn is_busy(message: &str) -> bool {
    message.contains("database is locked")
        || message.contains("database table is locked")
}
