// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structures stored to the database.

#[macro_use]
extern crate diesel;

mod cluster;
pub mod schema;
mod server;

pub use cluster::*;
pub use server::*;

/// Defines an enum stored as a `TEXT` column.
///
/// Each variant maps to the given string.  Strings that do not match any
/// variant decode as `$fallback` rather than failing the whole row.
macro_rules! impl_text_enum {
    (
        $(#[$model_meta:meta])*
        pub enum $model_type:ident;
        fallback = $fallback:ident;

        $($enum_item:ident => $sql_value:literal)+
    ) => {
        $(#[$model_meta])*
        #[derive(::diesel::AsExpression, ::diesel::FromSqlRow)]
        #[diesel(sql_type = ::diesel::sql_types::Text)]
        pub enum $model_type {
            $(
                $enum_item,
            )*
        }

        impl $model_type {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                    $model_type::$enum_item => $sql_value,
                    )*
                }
            }

            pub fn from_database_str(s: &str) -> Self {
                match s {
                    $(
                    $sql_value => $model_type::$enum_item,
                    )*
                    _ => $model_type::$fallback,
                }
            }
        }

        impl ::std::fmt::Display for $model_type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::diesel::serialize::ToSql<::diesel::sql_types::Text, ::diesel::sqlite::Sqlite> for $model_type {
            fn to_sql<'a>(
                &'a self,
                out: &mut ::diesel::serialize::Output<'a, '_, ::diesel::sqlite::Sqlite>,
            ) -> ::diesel::serialize::Result {
                <str as ::diesel::serialize::ToSql<::diesel::sql_types::Text, ::diesel::sqlite::Sqlite>>::to_sql(
                    self.as_str(),
                    out,
                )
            }
        }

        impl ::diesel::deserialize::FromSql<::diesel::sql_types::Text, ::diesel::sqlite::Sqlite> for $model_type {
            fn from_sql(
                bytes: <::diesel::sqlite::Sqlite as ::diesel::backend::Backend>::RawValue<'_>,
            ) -> ::diesel::deserialize::Result<Self> {
                let s = <String as ::diesel::deserialize::FromSql<
                    ::diesel::sql_types::Text,
                    ::diesel::sqlite::Sqlite,
                >>::from_sql(bytes)?;
                Ok($model_type::from_database_str(&s))
            }
        }
    }
}

pub(crate) use impl_text_enum;
