//! Rewrites the three ordered config lists (manifest files, ignored projects,
//! additional downloads) to match the edited mod mapping. Entries that did not
//! change keep their position; new entries always append at the tail so config
//! diffs stay stable. The whole pass runs on scratch copies and is swapped in
//! only on success.

use crate::{
    cache::Cache,
    lookup,
    pack::{AdditionalFileEntry, ManifestEntry, Pack},
    remote::{self, Client, RemoteError},
};
use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("mod {0} is enabled on neither client nor server")]
    InvalidPlacement(i64),
    #[error("could not extract a slug from additional file URL {0}")]
    BadAdditionalUrl(String),
    #[error("could not resolve additional file for {slug}: {source}")]
    Lookup {
        slug: String,
        #[source]
        source: RemoteError,
    },
}

pub fn apply(pack: &mut Pack, client: &Client, cache: &Cache) -> Result<(), ReconcileError> {
    let mut manifest_files = pack.manifest.files.clone();
    let mut ignore_project = pack
        .server_config
        .install
        .format_specific
        .ignore_project
        .clone();
    let mut additional_files = pack.server_config.install.additional_files.clone();

    // Position indexes over the current lists. Additional files are keyed by
    // the slug inside their URL; foreign downloads are not indexed and so are
    // never touched.
    let mut manifest_index: HashMap<i64, usize> = manifest_files
        .iter()
        .enumerate()
        .map(|(position, entry)| (entry.project_id, position))
        .collect();
    let mut ignore_index: HashMap<i64, usize> = ignore_project
        .iter()
        .enumerate()
        .map(|(position, &project_id)| (project_id, position))
        .collect();
    let mut additional_index: HashMap<String, usize> = HashMap::new();
    for (position, entry) in additional_files.iter().enumerate() {
        if !entry.url.starts_with(remote::PROJECT_URL_PREFIX) {
            continue;
        }
        let slug = remote::parse_project_slug(&entry.url)
            .ok_or_else(|| ReconcileError::BadAdditionalUrl(entry.url.clone()))?;
        additional_index.insert(slug, position);
    }

    for (&project_id, info) in &pack.mods {
        if info.on_client {
            sync_manifest(
                true,
                project_id,
                info.file_id,
                &mut manifest_files,
                &mut manifest_index,
            );
            sync_additional(
                false,
                &info.slug,
                info.file_id,
                &mut additional_files,
                &mut additional_index,
                client,
                cache,
            )?;
            sync_ignore(
                !info.on_server,
                project_id,
                &mut ignore_project,
                &mut ignore_index,
            );
        } else if info.on_server {
            sync_manifest(
                false,
                project_id,
                info.file_id,
                &mut manifest_files,
                &mut manifest_index,
            );
            sync_ignore(false, project_id, &mut ignore_project, &mut ignore_index);
            sync_additional(
                true,
                &info.slug,
                info.file_id,
                &mut additional_files,
                &mut additional_index,
                client,
                cache,
            )?;
        } else {
            return Err(ReconcileError::InvalidPlacement(project_id));
        }
    }

    // Whatever was never visited no longer exists in the mapping.
    remove_leftovers(&mut manifest_files, manifest_index);
    remove_leftovers(&mut ignore_project, ignore_index);
    remove_leftovers(&mut additional_files, additional_index);

    pack.manifest.files = manifest_files;
    pack.server_config.install.format_specific.ignore_project = ignore_project;
    pack.server_config.install.additional_files = additional_files;
    Ok(())
}

fn sync_manifest(
    should_exist: bool,
    project_id: i64,
    file_id: i64,
    files: &mut Vec<ManifestEntry>,
    index: &mut HashMap<i64, usize>,
) {
    if let Some(&position) = index.get(&project_id) {
        if should_exist {
            if files[position].file_id != file_id {
                debug!(
                    "manifest {project_id}: file {} -> {file_id}",
                    files[position].file_id
                );
                files[position].file_id = file_id;
            }
        } else {
            files.remove(position);
            debug!("manifest {project_id}: removed");
            shift_down(index, position);
        }
    } else if should_exist {
        files.push(ManifestEntry {
            project_id,
            file_id,
            required: true,
        });
        debug!("manifest {project_id}: added");
    }
    index.remove(&project_id);
}

fn sync_ignore(
    should_exist: bool,
    project_id: i64,
    ignored: &mut Vec<i64>,
    index: &mut HashMap<i64, usize>,
) {
    if let Some(&position) = index.get(&project_id) {
        if !should_exist {
            ignored.remove(position);
            debug!("ignore {project_id}: removed");
            shift_down(index, position);
        }
    } else if should_exist {
        ignored.push(project_id);
        debug!("ignore {project_id}: added");
    }
    index.remove(&project_id);
}

fn sync_additional(
    should_exist: bool,
    slug: &str,
    file_id: i64,
    files: &mut Vec<AdditionalFileEntry>,
    index: &mut HashMap<String, usize>,
    client: &Client,
    cache: &Cache,
) -> Result<(), ReconcileError> {
    if let Some(&position) = index.get(slug) {
        if should_exist {
            let current = remote::parse_project_url(&files[position].url).map(|(_, id)| id);
            if current != Some(file_id) {
                files[position] = new_additional_entry(slug, file_id, client, cache)?;
                debug!("additional {slug}: updated to file {file_id}");
            }
        } else {
            files.remove(position);
            debug!("additional {slug}: removed");
            shift_down(index, position);
        }
    } else if should_exist {
        let entry = new_additional_entry(slug, file_id, client, cache)?;
        files.push(entry);
        debug!("additional {slug}: added for file {file_id}");
    }
    index.remove(slug);
    Ok(())
}

fn new_additional_entry(
    slug: &str,
    file_id: i64,
    client: &Client,
    cache: &Cache,
) -> Result<AdditionalFileEntry, ReconcileError> {
    let file =
        lookup::file_for_slug(client, cache, slug, file_id).map_err(|source| {
            ReconcileError::Lookup {
                slug: slug.to_string(),
                source,
            }
        })?;
    Ok(AdditionalFileEntry {
        url: remote::download_url(slug, file_id),
        destination: format!("mods/{}", file.file_name_on_disk),
    })
}

fn shift_down<K: Eq + Hash>(index: &mut HashMap<K, usize>, removed: usize) {
    for position in index.values_mut() {
        if *position > removed {
            *position -= 1;
        }
    }
}

fn remove_leftovers<K, T>(items: &mut Vec<T>, index: HashMap<K, usize>) {
    let mut positions: Vec<usize> = index.into_values().collect();
    positions.sort_unstable_by(|a, b| b.cmp(a));
    for position in positions {
        items.remove(position);
    }
}
