// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use diesel::{prelude::*, SqliteConnection};
use typed_builder::TypedBuilder;

use crate::{
    db::{schema::image, DeferredTxConnection},
    image_store::ImageMode,
    utils::rfc3339_timestamp,
    Error,
};

/// Content addressed image. Rows are immutable once they have content.
#[derive(Clone, Debug, PartialEq, Eq, Queryable, Identifiable)]
#[diesel(table_name = image)]
#[diesel(primary_key(image_hash))]
pub struct Image {
    pub image_hash: String,
    /// `None` for linked images.
    pub content: Option<Vec<u8>>,
    pub uri: String,
    pub ext: String,
    pub mode: ImageMode,
    pub created_at: String,
}

impl Image {
    /// Find an image by hash. If `ext` is provided, it must match as well.
    pub fn find(
        conn: &mut SqliteConnection,
        image_hash: &str,
        ext: Option<&str>,
    ) -> Result<Option<Image>, Error> {
        use image::dsl as i;

        let query = i::image.filter(i::image_hash.eq(image_hash));
        let result = match ext {
            Some(ext) => query
                .filter(i::ext.eq(ext))
                .first::<Image>(conn)
                .optional()?,
            None => query.first::<Image>(conn).optional()?,
        };
        Ok(result)
    }

    pub fn exists(conn: &mut SqliteConnection, image_hash: &str) -> Result<bool, Error> {
        use image::dsl as i;

        let count: i64 = i::image
            .filter(i::image_hash.eq(image_hash))
            .count()
            .get_result(conn)?;
        Ok(count > 0)
    }

    pub fn count(conn: &mut SqliteConnection) -> Result<i64, Error> {
        use image::dsl as i;

        Ok(i::image.count().get_result(conn)?)
    }
}

#[derive(Debug, TypedBuilder, Insertable)]
#[diesel(table_name = image)]
pub struct NewImage<'a> {
    image_hash: &'a str,
    content: Option<&'a [u8]>,
    uri: &'a str,
    ext: &'a str,
    mode: ImageMode,
}

impl<'a> NewImage<'a> {
    /// Insert the image unless an image with the same hash exists. If the existing image is
    /// linked and this one has content, the content is filled in. Returns whether a row was
    /// written.
    pub fn upsert(&self, tx_conn: &mut DeferredTxConnection) -> Result<bool, Error> {
        use image::dsl as i;

        let inserted = diesel::insert_into(i::image)
            .values((self, i::created_at.eq(rfc3339_timestamp())))
            .on_conflict_do_nothing()
            .execute(tx_conn.as_mut())?;
        if inserted > 0 {
            return Ok(true);
        }

        let Some(content) = self.content else {
            return Ok(false);
        };
        let filled = diesel::update(
            i::image
                .filter(i::image_hash.eq(self.image_hash))
                .filter(i::content.is_null()),
        )
        .set((i::content.eq(content), i::mode.eq(self.mode)))
        .execute(tx_conn.as_mut())?;
        Ok(filled > 0)
    }
}
