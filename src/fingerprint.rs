//! Filenames derived from URLs.
//!
//! The same fingerprint names the file on disk and keys the filename index of
//! the download history, so it has to be stable across restarts.

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// First 8 bytes of SHA-256 over the raw URL, as 16 lowercase hex characters.
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}

/// Derives the filename for `url` from its last path segment.
///
/// Falls back to [`url_hash`] when the URL does not parse or the segment is not
/// usable as a plain file name (empty, `.`, `..`, or containing a separator once
/// percent-decoded).
pub fn filename_for(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|segment| percent_decode_str(&segment).decode_utf8_lossy().into_owned())
        .filter(|name| is_plain_name(name))
        .unwrap_or_else(|| url_hash(url))
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Inserts the URL hash between the base name and the extension: `name_hash.ext`.
pub fn disambiguate(filename: &str, url: &str) -> String {
    let hash = url_hash(url);
    let path = Path::new(filename);
    match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|s| s.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{}_{}.{}", stem, hash, ext),
        _ => format!("{}_{}", filename, hash),
    }
}
