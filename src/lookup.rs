//! Read-through composition over the cache and the remote client: check the
//! cache, on a miss fetch, on success store. A failed fetch propagates and
//! leaves the cache untouched.

use crate::{
    cache::Cache,
    remote::{AddonRecord, Client, FileRecord, RemoteError},
};

pub fn addon(client: &Client, cache: &Cache, addon_id: i64) -> Result<AddonRecord, RemoteError> {
    if let Some(record) = cache.get_addon(addon_id) {
        return Ok(record);
    }
    let record = client.fetch_addon(addon_id)?;
    cache.put_addon(record.clone());
    Ok(record)
}

pub fn file(
    client: &Client,
    cache: &Cache,
    addon_id: i64,
    file_id: i64,
) -> Result<FileRecord, RemoteError> {
    if let Some(record) = cache.get_file(file_id) {
        return Ok(record);
    }
    let record = client.fetch_file(addon_id, file_id)?;
    cache.put_file(record.clone());
    Ok(record)
}

pub fn addon_id_for_slug(
    client: &Client,
    cache: &Cache,
    slug: &str,
) -> Result<i64, RemoteError> {
    if let Some(addon_id) = cache.resolve_slug(slug) {
        return Ok(addon_id);
    }
    let addon_id = client.resolve_slug_to_id(slug)?;
    cache.record_slug(slug, addon_id);
    Ok(addon_id)
}

pub fn addon_for_slug(
    client: &Client,
    cache: &Cache,
    slug: &str,
) -> Result<AddonRecord, RemoteError> {
    let addon_id = addon_id_for_slug(client, cache, slug)?;
    addon(client, cache, addon_id)
}

pub fn file_for_slug(
    client: &Client,
    cache: &Cache,
    slug: &str,
    file_id: i64,
) -> Result<FileRecord, RemoteError> {
    let addon_id = addon_id_for_slug(client, cache, slug)?;
    file(client, cache, addon_id, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::AddonRecord;

    // Connection refused immediately; proves a code path never left the cache.
    fn unroutable() -> Client {
        Client::with_base_url("http://127.0.0.1:1")
    }

    fn cached_addon(id: i64, slug: &str) -> AddonRecord {
        AddonRecord {
            id,
            slug: slug.to_string(),
            available: true,
            ..AddonRecord::default()
        }
    }

    #[test]
    fn cached_slug_never_reaches_the_network() {
        let cache = Cache::ephemeral();
        cache.record_slug("foo", 7);
        cache.put_addon(cached_addon(7, "foo"));

        let record = addon_for_slug(&unroutable(), &cache, "foo").expect("served from cache");
        assert_eq!(record.id, 7);
    }

    #[test]
    fn fetch_failure_propagates_and_leaves_cache_unchanged() {
        let cache = Cache::ephemeral();
        let err = addon(&unroutable(), &cache, 42);
        assert!(matches!(err, Err(RemoteError::Transport(_))));
        assert!(cache.get_addon(42).is_none());
    }

    #[test]
    fn cached_file_is_served_without_addon_data() {
        let cache = Cache::ephemeral();
        cache.put_file(crate::remote::FileRecord {
            id: 20,
            available: true,
            ..crate::remote::FileRecord::default()
        });
        let record = file(&unroutable(), &cache, 2, 20).expect("served from cache");
        assert_eq!(record.id, 20);
    }
}
