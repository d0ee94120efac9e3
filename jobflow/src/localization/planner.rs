//! Turns input and output specifiers into staging actions.

use std::collections::BTreeMap;
use tracing::debug;

use super::storage::{self, staging_path, Glob, Specifier, LOG_PATH};
use crate::config::RunConfig;
use crate::core::{Action, ActionFlag};
use crate::errors::ConfigError;

/// Everything localization contributes to a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizationPlan {
    /// Actions that stage inputs, run before user actions.
    pub localizers: Vec<Action>,
    /// Actions that copy outputs back, run after user actions.
    pub delocalizers: Vec<Action>,
    /// Directories that must exist before anything runs.
    pub directories: Vec<String>,
    /// Variable name to staged path.
    pub environment: BTreeMap<String, String>,
}

/// Plans localization for one run configuration.
#[derive(Debug)]
pub struct LocalizationPlanner<'a> {
    config: &'a RunConfig,
}

impl<'a> LocalizationPlanner<'a> {
    /// Creates a planner over `config`.
    #[must_use]
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Root for staged inputs.
    #[must_use]
    pub fn input_root() -> String {
        staging_path("input")
    }

    /// Root for outputs awaiting upload.
    #[must_use]
    pub fn output_root() -> String {
        staging_path("output")
    }

    /// Scratch directory exposed as `TMPDIR`.
    #[must_use]
    pub fn tmp_root() -> String {
        staging_path("tmp")
    }

    /// Builds the plan, reading local input files from disk.
    pub fn plan(&self) -> Result<LocalizationPlan, ConfigError> {
        let mut plan = LocalizationPlan::default();
        plan.environment.insert("TMPDIR".to_string(), Self::tmp_root());
        plan.directories.push(Self::tmp_root());

        let buckets = self.plan_inputs(&mut plan)?;
        for (bucket, path) in buckets {
            plan.directories.push(path.clone());
            plan.localizers
                .extend(storage::fuse_mount(&self.config.fuse_image, &bucket, &path));
        }

        self.plan_outputs(&mut plan)?;

        if let Some(ref destination) = self.config.output {
            plan.delocalizers.push(
                storage::gsutil(&self.config.cloud_sdk_image, &["cp", LOG_PATH, destination.as_str()])
                    .with_flag(ActionFlag::AlwaysRun),
            );
        }

        debug!(
            localizers = plan.localizers.len(),
            delocalizers = plan.delocalizers.len(),
            directories = plan.directories.len(),
            "Planned localization"
        );
        Ok(plan)
    }

    /// Returns the background action that uploads the log every
    /// `output_interval`, when both a destination and an interval are set.
    #[must_use]
    pub fn periodic_log_upload(&self) -> Option<Action> {
        let destination = self.config.output.as_ref()?;
        let interval = self.config.output_interval?;
        let script = format!(
            "while true; do sleep {:.0}; gsutil -q cp {LOG_PATH} {destination}; done",
            interval.as_secs_f64()
        );
        Some(
            Action::bash(&self.config.cloud_sdk_image, [script])
                .with_flag(ActionFlag::RunInBackground),
        )
    }

    /// Plans inputs and returns the buckets deferred to FUSE mounts.
    fn plan_inputs(
        &self,
        plan: &mut LocalizationPlan,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        let root = Self::input_root();
        let mut buckets = BTreeMap::new();

        for spec in Specifier::parse_list(&self.config.inputs, "INPUT") {
            let target = spec.target_under(&root);
            plan.environment.insert(spec.name.clone(), target.clone());

            match spec.bucket() {
                Some(bucket) if self.config.fuse => {
                    buckets
                        .entry(bucket.to_string())
                        .or_insert_with(|| storage::join_paths(&[root.as_str(), bucket]));
                    continue;
                }
                Some(_) => plan.localizers.push(storage::transfer(
                    &self.config.cloud_sdk_image,
                    spec.glob(),
                    spec.base(),
                    &target,
                )),
                None => {
                    let contents = std::fs::read(spec.base()).map_err(|e| {
                        ConfigError::specifier(&spec.path, format!("reading input file: {e}"))
                    })?;
                    plan.localizers.push(storage::upload(
                        &self.config.cloud_sdk_image,
                        &contents,
                        &target,
                    ));
                }
            }

            plan.directories.push(required_directory(spec.glob(), &target));
        }
        Ok(buckets)
    }

    fn plan_outputs(&self, plan: &mut LocalizationPlan) -> Result<(), ConfigError> {
        let root = Self::output_root();

        for spec in Specifier::parse_list(&self.config.outputs, "OUTPUT") {
            if spec.bucket().is_none() {
                return Err(ConfigError::specifier(
                    &spec.path,
                    "outputs must be storage URIs",
                ));
            }
            let target = spec.target_under(&root);
            plan.environment.insert(spec.name.clone(), target.clone());
            plan.delocalizers.push(storage::transfer(
                &self.config.cloud_sdk_image,
                spec.glob(),
                &target,
                spec.base(),
            ));
            plan.directories.push(required_directory(spec.glob(), &target));
        }
        Ok(())
    }
}

fn required_directory(glob: Glob, target: &str) -> String {
    if glob.is_directory() {
        target.to_string()
    } else {
        storage::parent_dir(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const INPUT: &str = "/mnt/google/.google/input";
    const OUTPUT: &str = "/mnt/google/.google/output";

    fn plan(config: &RunConfig) -> LocalizationPlan {
        LocalizationPlanner::new(config).plan().unwrap()
    }

    #[test]
    fn test_single_object_input() {
        let config = RunConfig::new("p").with_inputs(["gs://b/obj"]);
        let plan = plan(&config);

        let target = plan.environment.get("INPUT0").unwrap();
        assert!(target.starts_with(INPUT));
        assert!(target.ends_with("/obj"));
        assert_eq!(plan.localizers.len(), 1);
        assert_eq!(
            plan.localizers[0].commands[1],
            format!("gsutil -q cp gs://b/obj {INPUT}/b/obj")
        );
        assert!(plan.directories.contains(&format!("{INPUT}/b")));
    }

    #[test]
    fn test_glob_input_binds_directory() {
        let single = plan(&RunConfig::new("p").with_inputs(["gs://b/obj"]));
        let glob = plan(&RunConfig::new("p").with_inputs(["gs://b/obj/*"]));

        assert_eq!(glob.environment["INPUT0"], format!("{INPUT}/b/obj"));
        assert!(glob.directories.contains(&format!("{INPUT}/b/obj")));
        assert_ne!(glob.localizers[0].commands, single.localizers[0].commands);
        assert!(glob.localizers[0].commands[1].contains(" -m cp "));
    }

    #[test]
    fn test_recursive_input() {
        let plan = plan(&RunConfig::new("p").with_inputs(["DATA=gs://b/dir/**"]));
        assert_eq!(
            plan.localizers[0].commands[1],
            format!("gsutil -q -m cp -r gs://b/dir/* {INPUT}/b/dir")
        );
        assert_eq!(plan.environment["DATA"], format!("{INPUT}/b/dir"));
    }

    #[test]
    fn test_tmpdir_always_bound() {
        let plan = plan(&RunConfig::new("p"));
        assert_eq!(plan.environment["TMPDIR"], "/mnt/google/.google/tmp");
        assert_eq!(plan.directories, vec!["/mnt/google/.google/tmp"]);
        assert!(plan.localizers.is_empty());
    }

    #[test]
    fn test_outputs_copy_back() {
        let config = RunConfig::new("p").with_outputs(["gs://b/out/file.txt", "gs://b/res/*"]);
        let plan = plan(&config);

        assert_eq!(plan.environment["OUTPUT0"], format!("{OUTPUT}/b/out/file.txt"));
        assert_eq!(plan.environment["OUTPUT1"], format!("{OUTPUT}/b/res"));
        assert_eq!(
            plan.delocalizers[0].commands[1],
            format!("gsutil -q cp {OUTPUT}/b/out/file.txt gs://b/out/file.txt")
        );
        assert_eq!(
            plan.delocalizers[1].commands[1],
            format!("gsutil -q -m cp {OUTPUT}/b/res/* gs://b/res/")
        );
        assert!(plan.directories.contains(&format!("{OUTPUT}/b/out")));
        assert!(plan.directories.contains(&format!("{OUTPUT}/b/res")));
    }

    #[test]
    fn test_local_output_rejected() {
        let config = RunConfig::new("p").with_outputs(["/local/out"]);
        let err = LocalizationPlanner::new(&config).plan().unwrap_err();
        assert!(matches!(err, ConfigError::Specifier { .. }));
    }

    #[test]
    fn test_local_input_uploaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "hello").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let plan = plan(&RunConfig::new("p").with_inputs([format!("CFG={path}")]));
        let target = format!("{INPUT}{path}");

        assert_eq!(plan.environment["CFG"], target);
        assert!(plan.localizers[0].commands[1].contains("echo \"aGVsbG8=\" | base64 -d"));
        assert!(plan.directories.contains(&storage::parent_dir(&target)));
    }

    #[test]
    fn test_missing_local_input() {
        let config = RunConfig::new("p").with_inputs(["/does/not/exist/anywhere"]);
        let err = LocalizationPlanner::new(&config).plan().unwrap_err();
        match err {
            ConfigError::Specifier { specifier, message } => {
                assert_eq!(specifier, "/does/not/exist/anywhere");
                assert!(message.starts_with("reading input file"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fuse_mounts_once_per_bucket() {
        let mut config = RunConfig::new("p").with_inputs(["gs://b/x", "gs://b/y/*", "gs://a/z"]);
        config.fuse = true;
        let plan = plan(&config);

        assert_eq!(plan.localizers.len(), 4);
        assert_eq!(plan.localizers[0].commands[2], "a");
        assert!(plan.localizers[0].has_flag(ActionFlag::EnableFuse));
        assert_eq!(plan.localizers[1].commands, vec!["wait".to_string(), format!("{INPUT}/a")]);
        assert_eq!(plan.localizers[2].commands[2], "b");
        assert_eq!(plan.environment["INPUT1"], format!("{INPUT}/b/y"));
        assert!(plan.directories.contains(&format!("{INPUT}/b")));
    }

    #[test]
    fn test_log_upload_always_runs() {
        let plan = plan(&RunConfig::new("p").with_output("gs://b/logs/run.log"));
        let upload = plan.delocalizers.last().unwrap();
        assert!(upload.has_flag(ActionFlag::AlwaysRun));
        assert_eq!(
            upload.commands[1],
            "gsutil -q cp /google/logs/output gs://b/logs/run.log"
        );
    }

    #[test]
    fn test_periodic_log_upload() {
        let mut config = RunConfig::new("p");
        assert!(LocalizationPlanner::new(&config).periodic_log_upload().is_none());

        config = config.with_output("gs://b/log");
        config.output_interval = Some(Duration::from_secs(30));
        let action = LocalizationPlanner::new(&config).periodic_log_upload().unwrap();
        assert!(action.has_flag(ActionFlag::RunInBackground));
        assert_eq!(
            action.commands[1],
            "while true; do sleep 30; gsutil -q cp /google/logs/output gs://b/log; done"
        );
    }
}
