use crate::config::MirrorConfig;
use crate::error::Result;
use crate::index::VersionIndex;

pub struct LatestCommand<'a> {
    config: &'a MirrorConfig,
}

impl<'a> LatestCommand<'a> {
    pub fn new(config: &'a MirrorConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, launcher: Option<&str>) -> Result<()> {
        let index = VersionIndex::new(self.config.storage_path.clone());
        index.init_from_disk()?;

        match launcher {
            Some(launcher) => match index.latest_version(launcher) {
                Some(version) => println!("{version}"),
                None => println!("No versions mirrored for {launcher}"),
            },
            None => {
                let latest = index.latest_map();
                if latest.is_empty() {
                    println!("No versions mirrored");
                    return Ok(());
                }
                for (launcher, version) in latest {
                    println!("{launcher}\t{version}");
                }
            }
        }
        Ok(())
    }
}
