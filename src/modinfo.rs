use crate::{
    cache::Cache,
    lookup,
    pack::{ModInfo, Pack},
    remote::{self, Client, DependencyEdge},
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
    thread,
};
use tracing::{debug, warn};

pub const DEFAULT_LOOKUP_WORKERS: usize = 8;

enum LookupJob {
    Manifest { project_id: i64, file_id: i64 },
    Additional { url: String },
}

// Rebuilds the pack's mod mapping from the manifest and the server config,
// fanning lookups out over a bounded worker pool. A failed lookup leaves an
// error marker on that mod and the rest of the batch proceeds.
pub fn refresh(pack: &mut Pack, client: &Client, cache: &Cache, workers: usize) {
    let mut jobs = VecDeque::new();
    for entry in &pack.manifest.files {
        jobs.push_back(LookupJob::Manifest {
            project_id: entry.project_id,
            file_id: entry.file_id,
        });
    }
    for entry in &pack.server_config.install.additional_files {
        // Direct downloads from elsewhere are not ours to manage.
        if remote::parse_project_url(&entry.url).is_some() {
            jobs.push_back(LookupJob::Additional {
                url: entry.url.clone(),
            });
        }
    }

    let job_count = jobs.len();
    let ignored = pack.server_config.install.format_specific.ignore_project.clone();
    let queue = Mutex::new(jobs);
    let results: Mutex<BTreeMap<i64, ModInfo>> = Mutex::new(BTreeMap::new());

    let worker_count = workers.max(1).min(job_count);
    if worker_count > 0 {
        thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| loop {
                    let job = match queue.lock() {
                        Ok(mut queue) => match queue.pop_front() {
                            Some(job) => job,
                            None => break,
                        },
                        Err(_) => break,
                    };
                    if let Some((project_id, info)) = run_job(job, client, cache, &ignored) {
                        if let Ok(mut results) = results.lock() {
                            results.insert(project_id, info);
                        }
                    }
                });
            }
        });
    }

    let mut mods = results.into_inner().unwrap_or_else(|err| err.into_inner());
    link_dependants(&mut mods);
    debug!("refreshed {} mods from {job_count} lookups", mods.len());

    pack.mods = mods;
    // One snapshot write per batch, after the join.
    cache.save();
}

fn run_job(
    job: LookupJob,
    client: &Client,
    cache: &Cache,
    ignored: &[i64],
) -> Option<(i64, ModInfo)> {
    match job {
        LookupJob::Manifest {
            project_id,
            file_id,
        } => Some((
            project_id,
            manifest_mod_info(client, cache, project_id, file_id, ignored),
        )),
        LookupJob::Additional { url } => additional_mod_info(client, cache, &url),
    }
}

fn manifest_mod_info(
    client: &Client,
    cache: &Cache,
    project_id: i64,
    file_id: i64,
    ignored: &[i64],
) -> ModInfo {
    let addon = match lookup::addon(client, cache, project_id) {
        Ok(addon) => addon,
        Err(err) => return ModInfo::failed(err),
    };
    let file = match lookup::file(client, cache, project_id, file_id) {
        Ok(file) => file,
        Err(err) => return ModInfo::failed(err),
    };

    ModInfo {
        name: addon.name,
        icon_url: remote::icon_url(&addon.attachments),
        summary: addon.summary,
        website_url: addon.website_url,
        slug: addon.slug,
        on_client: true,
        on_server: !ignored.contains(&project_id),
        file_id,
        dependencies: file.dependencies,
        dependants: Vec::new(),
        error: None,
    }
}

fn additional_mod_info(client: &Client, cache: &Cache, url: &str) -> Option<(i64, ModInfo)> {
    let (slug, file_id) = remote::parse_project_url(url)?;
    let addon = match lookup::addon_for_slug(client, cache, &slug) {
        Ok(addon) => addon,
        Err(err) => {
            // No project id to hang an error marker on yet.
            warn!("could not resolve additional file {url}: {err}");
            return None;
        }
    };
    let file = match lookup::file(client, cache, addon.id, file_id) {
        Ok(file) => file,
        Err(err) => return Some((addon.id, ModInfo::failed(err))),
    };

    Some((
        addon.id,
        ModInfo {
            name: addon.name,
            icon_url: remote::icon_url(&addon.attachments),
            summary: addon.summary,
            website_url: addon.website_url,
            slug: addon.slug,
            on_client: false,
            on_server: true,
            file_id,
            dependencies: file.dependencies,
            dependants: Vec::new(),
            error: None,
        },
    ))
}

// Runs strictly after the join so every record already exists.
fn link_dependants(mods: &mut BTreeMap<i64, ModInfo>) {
    let mut edges = Vec::new();
    for (&project_id, info) in mods.iter() {
        for dep in &info.dependencies {
            edges.push((
                dep.addon_id,
                DependencyEdge {
                    addon_id: project_id,
                    kind: dep.kind.clone(),
                },
            ));
        }
    }
    for (target, edge) in edges {
        if let Some(info) = mods.get_mut(&target) {
            info.dependants.push(edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{AdditionalFileEntry, ManifestEntry};
    use crate::remote::{AddonRecord, FileRecord};
    use tempfile::tempdir;

    fn unroutable() -> Client {
        Client::with_base_url("http://127.0.0.1:1")
    }

    fn seeded_cache() -> Cache {
        let cache = Cache::ephemeral();
        cache.put_addon(AddonRecord {
            id: 1,
            name: "Alpha".to_string(),
            slug: "alpha".to_string(),
            summary: "first".to_string(),
            available: true,
            ..AddonRecord::default()
        });
        cache.put_addon(AddonRecord {
            id: 2,
            name: "Beta".to_string(),
            slug: "beta".to_string(),
            available: true,
            ..AddonRecord::default()
        });
        cache.put_file(FileRecord {
            id: 10,
            file_name_on_disk: "alpha.jar".to_string(),
            dependencies: vec![DependencyEdge {
                addon_id: 2,
                kind: "Required".to_string(),
            }],
            available: true,
            ..FileRecord::default()
        });
        cache.put_file(FileRecord {
            id: 20,
            file_name_on_disk: "beta.jar".to_string(),
            available: true,
            ..FileRecord::default()
        });
        cache
    }

    fn demo_pack() -> Pack {
        let dir = tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"files": [
                {"projectID": 1, "fileID": 10, "required": true},
                {"projectID": 2, "fileID": 20, "required": true}
            ]}"#,
        )
        .expect("write manifest");
        std::fs::write(
            dir.path().join("server-setup-config.yaml"),
            "install:\n  formatSpecific:\n    ignoreProject:\n      - 2\n",
        )
        .expect("write config");
        Pack::load(dir.path()).expect("load")
    }

    #[test]
    fn refresh_populates_mapping_from_cache() {
        let mut pack = demo_pack();
        refresh(&mut pack, &unroutable(), &seeded_cache(), 4);

        assert_eq!(pack.mods.len(), 2);
        let alpha = &pack.mods[&1];
        assert_eq!(alpha.name, "Alpha");
        assert_eq!(alpha.slug, "alpha");
        assert!(alpha.on_client);
        assert!(alpha.on_server);
        assert_eq!(alpha.file_id, 10);
        assert!(alpha.error.is_none());

        // Project 2 sits in the ignore list.
        let beta = &pack.mods[&2];
        assert!(beta.on_client);
        assert!(!beta.on_server);
    }

    #[test]
    fn refresh_links_dependants_after_the_join() {
        let mut pack = demo_pack();
        refresh(&mut pack, &unroutable(), &seeded_cache(), 2);

        let beta = &pack.mods[&2];
        assert_eq!(beta.dependants.len(), 1);
        assert_eq!(beta.dependants[0].addon_id, 1);
        assert_eq!(beta.dependants[0].kind, "Required");
    }

    #[test]
    fn failed_lookup_leaves_error_marker_and_batch_continues() {
        let mut pack = demo_pack();
        pack.manifest.files.push(ManifestEntry {
            project_id: 999,
            file_id: 9990,
            required: true,
        });
        refresh(&mut pack, &unroutable(), &seeded_cache(), 4);

        assert_eq!(pack.mods.len(), 3);
        let broken = &pack.mods[&999];
        assert!(broken.error.is_some());
        assert!(broken.name.is_empty());
        assert!(!broken.on_client && !broken.on_server);
        assert!(pack.mods[&1].error.is_none());
    }

    #[test]
    fn additional_files_become_server_only_mods() {
        let mut pack = demo_pack();
        let cache = seeded_cache();
        cache.record_slug("gamma", 3);
        cache.put_addon(AddonRecord {
            id: 3,
            name: "Gamma".to_string(),
            slug: "gamma".to_string(),
            available: true,
            ..AddonRecord::default()
        });
        cache.put_file(FileRecord {
            id: 30,
            file_name_on_disk: "gamma.jar".to_string(),
            available: true,
            ..FileRecord::default()
        });
        pack.server_config.install.additional_files = vec![
            AdditionalFileEntry {
                url: "https://minecraft.curseforge.com/projects/gamma/files/30/download"
                    .to_string(),
                destination: "mods/gamma.jar".to_string(),
            },
            // Foreign downloads are skipped entirely.
            AdditionalFileEntry {
                url: "https://example.com/custom.jar".to_string(),
                destination: "mods/custom.jar".to_string(),
            },
        ];

        refresh(&mut pack, &unroutable(), &cache, 4);

        let gamma = &pack.mods[&3];
        assert!(!gamma.on_client);
        assert!(gamma.on_server);
        assert_eq!(gamma.file_id, 30);
        assert!(!pack.mods.contains_key(&0));
    }

    #[test]
    fn refresh_with_empty_pack_yields_empty_mapping() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("manifest.json"), "{}").expect("write manifest");
        std::fs::write(dir.path().join("server-setup-config.yaml"), "{}").expect("write config");
        let mut pack = Pack::load(dir.path()).expect("load");

        refresh(&mut pack, &unroutable(), &Cache::ephemeral(), 4);
        assert!(pack.mods.is_empty());
    }
}
