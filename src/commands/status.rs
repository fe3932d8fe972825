use crate::config::MirrorConfig;
use crate::error::Result;
use crate::index::VersionIndex;
use crate::manifest::Manifest;
use comfy_table::Table;

pub struct StatusCommand<'a> {
    config: &'a MirrorConfig,
}

impl<'a> StatusCommand<'a> {
    pub fn new(config: &'a MirrorConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, launcher: Option<&str>) -> Result<()> {
        let index = VersionIndex::new(self.config.storage_path.clone());
        index.init_from_disk()?;

        let listing: Vec<(String, Vec<Manifest>)> = match launcher {
            Some(launcher) => match index.launcher_manifests(launcher) {
                Some(manifests) => vec![(launcher.to_string(), manifests)],
                None => {
                    println!("No versions mirrored for {launcher}");
                    return Ok(());
                }
            },
            None => index.all_manifests().into_iter().collect(),
        };

        if listing.iter().all(|(_, manifests)| manifests.is_empty()) {
            println!("No versions mirrored");
            return Ok(());
        }

        let latest = index.latest_map();
        let mut table = Table::new();
        table.set_header(vec!["Launcher", "Version", "Name", "Published", "Assets"]);
        for (launcher, manifests) in listing {
            for manifest in manifests {
                let marker = if latest.get(&launcher) == Some(&manifest.tag_name) {
                    " *"
                } else {
                    ""
                };
                table.add_row(vec![
                    launcher.clone(),
                    format!("{}{marker}", manifest.tag_name),
                    manifest.name.clone(),
                    manifest.published_at.format("%Y-%m-%d %H:%M").to_string(),
                    manifest.assets.len().to_string(),
                ]);
            }
        }
        println!("{table}");
        Ok(())
    }
}
