// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Implement `ToSql` using the type's `to_string` method and `FromSql` using the type's `FromStr`
/// implementation. Used for the enum columns of the token store (network type, image mode etc.)
/// so that they're stored as readable text and rejected on read if they don't parse.
#[macro_export]
macro_rules! sql_text {
    ($type_name:ident) => {
        impl diesel::deserialize::FromSql<diesel::sql_types::Text, diesel::sqlite::Sqlite>
            for $type_name
        {
            fn from_sql(
                bytes: diesel::backend::RawValue<diesel::sqlite::Sqlite>,
            ) -> diesel::deserialize::Result<Self> {
                use std::string::String;

                use diesel::{deserialize::FromSql, sql_types::Text, sqlite::Sqlite};

                let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                let result: $type_name = s.parse()?;
                Ok(result)
            }
        }

        impl diesel::serialize::ToSql<diesel::sql_types::Text, diesel::sqlite::Sqlite>
            for $type_name
        {
            fn to_sql(
                &self,
                out: &mut diesel::serialize::Output<diesel::sqlite::Sqlite>,
            ) -> diesel::serialize::Result {
                let s = self.to_string();
                out.set_value(s);
                Ok(diesel::serialize::IsNull::No)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::{fmt, str::FromStr};

    use anyhow::Result;
    use diesel::{
        deserialize::FromSqlRow, expression::AsExpression, select, sql_types::Text,
        Connection, IntoSql, RunQueryDsl, SqliteConnection,
    };

    fn connection() -> SqliteConnection {
        SqliteConnection::establish(":memory:").expect("in memory db")
    }

    #[derive(Debug, Clone, Copy, Eq, PartialEq, AsExpression, FromSqlRow)]
    #[diesel(sql_type = Text)]
    enum StorageMode {
        Save,
        Link,
    }

    impl fmt::Display for StorageMode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Save => write!(f, "save"),
                Self::Link => write!(f, "link"),
            }
        }
    }

    impl FromStr for StorageMode {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
            match s {
                "save" => Ok(Self::Save),
                "link" => Ok(Self::Link),
                other => Err(anyhow::anyhow!("unknown storage mode '{other}'")),
            }
        }
    }

    sql_text!(StorageMode);

    #[test]
    fn text_round_trip() -> Result<()> {
        let conn = &mut connection();
        for mode in [StorageMode::Save, StorageMode::Link] {
            let result: StorageMode =
                select(mode.into_sql::<Text>()).get_result(conn)?;
            assert_eq!(result, mode);
        }
        Ok(())
    }

    #[test]
    fn stored_as_display_string() -> Result<()> {
        let conn = &mut connection();
        let stored: String =
            select(StorageMode::Link.into_sql::<Text>()).get_result(conn)?;
        assert_eq!(stored, "link");
        Ok(())
    }

    #[test]
    fn unknown_text_fails_to_load() {
        let conn = &mut connection();
        let result: diesel::QueryResult<StorageMode> =
            select("mirror".into_sql::<Text>()).get_result(conn);
        assert!(result.is_err());
    }
}
