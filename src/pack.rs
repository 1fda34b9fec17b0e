use crate::remote::DependencyEdge;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

// manifest.json — the client-side mod list. Field names follow the curse
// manifest format; everything outside `files` passes through untouched.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
    pub minecraft: MinecraftBlock,
    pub manifest_type: String,
    pub manifest_version: i64,
    pub name: String,
    pub version: String,
    pub author: String,
    #[serde(rename = "projectID")]
    pub project_id: i64,
    pub files: Vec<ManifestEntry>,
    pub overrides: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MinecraftBlock {
    pub version: String,
    pub mod_loaders: Vec<ModLoader>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModLoader {
    pub id: String,
    pub primary: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestEntry {
    #[serde(rename = "projectID")]
    pub project_id: i64,
    #[serde(rename = "fileID")]
    pub file_id: i64,
    pub required: bool,
}

// server-setup-config.yaml — the ServerStarter config. The engine only edits
// install.formatSpecific.ignoreProject and install.additionalFiles.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSetupConfig {
    #[serde(rename = "_specver")]
    pub specver: i64,
    pub modpack: ModpackBlock,
    pub install: InstallBlock,
    pub launch: LaunchBlock,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModpackBlock {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstallBlock {
    pub mc_version: String,
    pub forge_version: String,
    pub forge_installer_url: String,
    pub modpack_url: String,
    pub modpack_format: String,
    pub format_specific: FormatSpecificBlock,
    pub base_install_path: String,
    pub ignore_files: Vec<String>,
    pub additional_files: Vec<AdditionalFileEntry>,
    pub local_files: Vec<LocalFileEntry>,
    pub check_folder: bool,
    pub install_forge: bool,
    pub sponge_bootstrapper: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormatSpecificBlock {
    pub ignore_project: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdditionalFileEntry {
    pub url: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFileEntry {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchBlock {
    pub spongefix: bool,
    pub check_offline: bool,
    pub max_ram: String,
    pub auto_restart: bool,
    pub crash_limit: i64,
    pub crash_timer: String,
    pub pre_java_args: String,
    pub java_args: Vec<String>,
}

// Presentation record per mod, rebuilt wholesale by the aggregator. A record
// whose lookup failed carries only the error marker.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModInfo {
    pub name: String,
    pub icon_url: String,
    pub summary: String,
    pub website_url: String,
    pub slug: String,
    pub on_client: bool,
    pub on_server: bool,
    pub file_id: i64,
    pub dependencies: Vec<DependencyEdge>,
    pub dependants: Vec<DependencyEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModInfo {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

pub struct Pack {
    pub folder: PathBuf,
    pub manifest: Manifest,
    pub server_config: ServerSetupConfig,
    pub mods: BTreeMap<i64, ModInfo>,
}

impl Pack {
    pub fn load(folder: &Path) -> Result<Self> {
        let folder = std::path::absolute(folder).context("resolve pack folder")?;

        let raw = fs::read_to_string(folder.join("manifest.json")).context("read manifest.json")?;
        let manifest: Manifest = serde_json::from_str(&raw).context("parse manifest.json")?;

        let raw = fs::read_to_string(folder.join("server-setup-config.yaml"))
            .context("read server-setup-config.yaml")?;
        let server_config: ServerSetupConfig =
            serde_yaml::from_str(&raw).context("parse server-setup-config.yaml")?;

        Ok(Self {
            folder,
            manifest,
            server_config,
            mods: BTreeMap::new(),
        })
    }

    pub fn save_config_files(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.manifest).context("serialize manifest.json")?;
        fs::write(self.folder.join("manifest.json"), raw).context("write manifest.json")?;

        let raw = serde_yaml::to_string(&self.server_config)
            .context("serialize server-setup-config.yaml")?;
        fs::write(self.folder.join("server-setup-config.yaml"), raw)
            .context("write server-setup-config.yaml")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "minecraft": {
            "version": "1.12.2",
            "modLoaders": [{"id": "forge-14.23.5.2847", "primary": true}]
        },
        "manifestType": "minecraftModpack",
        "manifestVersion": 1,
        "name": "Demo Pack",
        "version": "0.1",
        "author": "someone",
        "projectID": 0,
        "files": [
            {"projectID": 1, "fileID": 10, "required": true},
            {"projectID": 2, "fileID": 20, "required": false}
        ],
        "overrides": "overrides"
    }"#;

    const SERVER_CONFIG: &str = r#"
_specver: 1
modpack:
  name: Demo Pack
  description: demo
install:
  mcVersion: 1.12.2
  forgeVersion: 14.23.5.2847
  formatSpecific:
    ignoreProject:
      - 2
  additionalFiles:
    - url: https://minecraft.curseforge.com/projects/server-only/files/30/download
      destination: mods/server-only.jar
  installForge: true
launch:
  maxRam: 4G
  javaArgs:
    - -XX:+UseG1GC
"#;

    #[test]
    fn manifest_round_trip_preserves_fields_and_order() {
        let manifest: Manifest = serde_json::from_str(MANIFEST).expect("parse");
        assert_eq!(manifest.minecraft.version, "1.12.2");
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].project_id, 1);
        assert!(!manifest.files[1].required);

        let raw = serde_json::to_string_pretty(&manifest).expect("serialize");
        assert!(raw.contains("\"projectID\": 1"));
        assert!(raw.contains("\"fileID\": 10"));
        assert!(raw.contains("\"manifestType\": \"minecraftModpack\""));
        let reparsed: Manifest = serde_json::from_str(&raw).expect("reparse");
        assert_eq!(reparsed.files, manifest.files);
    }

    #[test]
    fn server_config_round_trip_preserves_core_lists() {
        let config: ServerSetupConfig = serde_yaml::from_str(SERVER_CONFIG).expect("parse");
        assert_eq!(config.install.format_specific.ignore_project, vec![2]);
        assert_eq!(config.install.additional_files.len(), 1);
        assert!(config.install.install_forge);
        assert_eq!(config.launch.max_ram, "4G");

        let raw = serde_yaml::to_string(&config).expect("serialize");
        assert!(raw.contains("ignoreProject"));
        assert!(raw.contains("mods/server-only.jar"));
        let reparsed: ServerSetupConfig = serde_yaml::from_str(&raw).expect("reparse");
        assert_eq!(
            reparsed.install.additional_files,
            config.install.additional_files
        );
        assert_eq!(reparsed.launch.java_args, config.launch.java_args);
    }

    #[test]
    fn pack_loads_and_saves_both_config_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("manifest.json"), MANIFEST).expect("write manifest");
        fs::write(dir.path().join("server-setup-config.yaml"), SERVER_CONFIG)
            .expect("write config");

        let mut pack = Pack::load(dir.path()).expect("load");
        assert_eq!(pack.manifest.files.len(), 2);

        pack.manifest.files[0].file_id = 11;
        pack.save_config_files().expect("save");

        let reloaded = Pack::load(dir.path()).expect("reload");
        assert_eq!(reloaded.manifest.files[0].file_id, 11);
        assert_eq!(
            reloaded.server_config.install.format_specific.ignore_project,
            vec![2]
        );
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Pack::load(dir.path()).is_err());
    }
}
