// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{path::Path, time::SystemTime};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::Error;

/// Create an RFC339 timestamp, eg.: "2018-01-26T18:30:09.453Z".
/// From: https://stackoverflow.com/a/64148017
pub fn rfc3339_timestamp() -> String {
    let now = SystemTime::now();
    let dt: DateTime<Utc> = now.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_rfc3339_timestamp(s: &str) -> Result<DateTime<FixedOffset>, Error> {
    DateTime::parse_from_rfc3339(s).map_err(|err| Error::Malformed {
        error: err.to_string(),
    })
}

/// Lower case file extension with a leading dot, eg. ".png", or an empty string.
pub fn dotted_extension(path: &str) -> String {
    // Ignore query and fragment of urls.
    let path = path.split(['?', '#']).next().unwrap_or_default();
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}
