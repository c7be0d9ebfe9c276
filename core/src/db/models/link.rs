// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};

use crate::{
    db::{schema::link, DeferredTxConnection},
    utils::rfc3339_timestamp,
    Error,
};

/// Cache of which image a source uri resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = link)]
#[diesel(primary_key(uri))]
pub struct Link {
    pub uri: String,
    pub image_hash: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Link {
    pub fn upsert(
        tx_conn: &mut DeferredTxConnection,
        uri: &str,
        image_hash: &str,
    ) -> Result<(), Error> {
        use link::dsl as l;

        let now = rfc3339_timestamp();
        diesel::insert_into(l::link)
            .values((
                l::uri.eq(uri),
                l::image_hash.eq(image_hash),
                l::created_at.eq(&now),
            ))
            .on_conflict(l::uri)
            .do_update()
            .set((l::image_hash.eq(image_hash), l::updated_at.eq(&now)))
            .execute(tx_conn.as_mut())?;
        Ok(())
    }

    pub fn find(conn: &mut SqliteConnection, uri: &str) -> Result<Option<Link>, Error> {
        use link::dsl as l;

        Ok(l::link.filter(l::uri.eq(uri)).first::<Link>(conn).optional()?)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use diesel::sql_query;

    use super::*;
    use crate::db::TmpDb;

    #[test]
    fn upsert_points_to_latest_image() -> Result<()> {
        let db = TmpDb::new()?;
        let uri = "https://a.example/logo.png";
        db.pool.deferred_transaction(|mut tx_conn| {
            sql_query(
                "INSERT INTO image (image_hash, content, uri, ext, mode, created_at) VALUES \
                 ('h1', NULL, 'u', '.png', 'link', 'now'), \
                 ('h2', NULL, 'u', '.png', 'link', 'now')",
            )
            .execute(tx_conn.as_mut())?;
            Link::upsert(&mut tx_conn, uri, "h1")?;
            Link::upsert(&mut tx_conn, uri, "h2")
        })?;

        let mut conn = db.pool.connection()?;
        let link = Link::find(&mut conn, uri)?.expect("link exists");
        assert_eq!(link.image_hash, "h2");
        assert!(link.updated_at.is_some());
        Ok(())
    }
}
