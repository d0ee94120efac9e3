//! Assembly of the final request from parsed actions and the run config.

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::core::{
    Accelerator, Action, ActionFlag, Disk, Network, Pipeline, Request, Resources,
    ServiceAccount, VirtualMachine, SHARED_PID_NAMESPACE, WORKING_DISK,
};
use crate::errors::Result;
use crate::localization::{mkdir_command, LocalizationPlanner};
use crate::resources::{LocationLister, Locations};
use crate::script::{format_seconds, is_cloud_command, ParsedScript, ScriptParser, ScriptSource};

/// Scope granted to the VM when an action talks to object storage.
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Image family prefix for container-optimized OS boot images.
pub const COS_IMAGE_FAMILY: &str = "projects/cos-cloud/global/images/family/cos-";

/// Builds requests for one run configuration.
pub struct RequestAssembler<'a> {
    config: &'a RunConfig,
    lister: &'a dyn LocationLister,
}

impl std::fmt::Debug for RequestAssembler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAssembler")
            .field("project", &self.config.project)
            .finish_non_exhaustive()
    }
}

impl<'a> RequestAssembler<'a> {
    /// Creates an assembler; `lister` resolves zone and region prefixes.
    #[must_use]
    pub fn new(config: &'a RunConfig, lister: &'a dyn LocationLister) -> Self {
        Self { config, lister }
    }

    /// Compiles the job description named by the configuration.
    pub async fn compile(&self) -> Result<Request> {
        let source = ScriptSource::resolve(
            self.config.command.as_deref(),
            self.config.script.as_deref(),
        )?;
        self.compile_source(&source).await
    }

    /// Compiles a job description from an explicit source.
    ///
    /// A description that is already a complete request is returned
    /// unchanged; nothing from the configuration is applied to it. It must
    /// still name zones or regions, not both.
    pub async fn compile_source(&self, source: &ScriptSource) -> Result<Request> {
        match ScriptParser::from_config(self.config).parse_source(source)? {
            ParsedScript::Request(request) => {
                request.pipeline.resources.validate()?;
                debug!("Using raw request as-is");
                Ok(*request)
            }
            ParsedScript::Actions(actions) => self.assemble(actions).await,
        }
    }

    /// Wraps user actions with staging steps and fills in resources.
    ///
    /// Actions run in this order: directory creation, the debug ssh server,
    /// localization, the periodic log upload, user actions, delocalization
    /// (ending with the final log upload).
    pub async fn assemble(&self, user_actions: Vec<Action>) -> Result<Request> {
        let config = self.config;
        config.validate()?;

        let planner = LocalizationPlanner::new(config);
        let plan = planner.plan()?;

        let mut environment = config.environment.clone();
        environment.extend(plan.environment);

        let mut actions = Vec::with_capacity(user_actions.len() + 4);
        if let Some(command) = mkdir_command(plan.directories) {
            actions.push(Action::bash(&config.cloud_sdk_image, [command]));
        }
        if config.ssh {
            actions.push(self.ssh_debug());
        }
        actions.extend(plan.localizers);
        actions.extend(planner.periodic_log_upload());
        actions.extend(user_actions);
        actions.extend(plan.delocalizers);

        let locations = Locations::resolve(config, self.lister).await?;

        let mut pipeline = Pipeline {
            actions,
            environment,
            resources: Resources {
                project_id: config.project.clone(),
                zones: locations.zones,
                regions: locations.regions,
                virtual_machine: self.virtual_machine(),
            },
            timeout: config.timeout.map(format_seconds),
        };

        self.add_required_disks(&mut pipeline);
        self.add_required_scope(&mut pipeline);

        if config.share_pids {
            for action in &mut pipeline.actions {
                action.pid_namespace = Some(SHARED_PID_NAMESPACE.to_string());
            }
        }

        let mut labels = config.labels.clone();
        if let Some(ref name) = config.name {
            labels.insert("name".to_string(), name.clone());
        }

        info!(
            actions = pipeline.actions.len(),
            disks = pipeline.resources.virtual_machine.disks.len(),
            "Assembled pipeline request"
        );
        Ok(Request { pipeline, labels })
    }

    fn ssh_debug(&self) -> Action {
        Action::new(&self.config.debug_image)
            .with_entrypoint("ssh-server")
            .with_port("22", 22)
            .with_flag(ActionFlag::RunInBackground)
    }

    fn virtual_machine(&self) -> VirtualMachine {
        let config = self.config;
        let mut vm = VirtualMachine {
            machine_type: config.machine_type.clone(),
            labels: config.vm_labels.clone(),
            network: Network {
                name: config.network.clone().unwrap_or_default(),
                subnetwork: config.subnetwork.clone().unwrap_or_default(),
                use_private_address: config.private_address,
            },
            service_account: ServiceAccount {
                email: config.service_account.clone().unwrap_or_default(),
                scopes: config.scopes.clone(),
            },
            boot_image: config
                .cos_channel
                .as_ref()
                .filter(|c| !c.is_empty())
                .map(|channel| format!("{COS_IMAGE_FAMILY}{channel}")),
            boot_disk_size_gb: config.boot_disk_size_gb,
            ..Default::default()
        };
        if config.gpus > 0 {
            vm.accelerators.push(Accelerator {
                accelerator_type: config.gpu_type.clone(),
                count: config.gpus,
            });
        }
        vm
    }

    /// Adds one disk per distinct mounted disk name, in first-seen order.
    fn add_required_disks(&self, pipeline: &mut Pipeline) {
        let mut names: Vec<&str> = Vec::new();
        for mount in pipeline.actions.iter().flat_map(|a| &a.mounts) {
            if !names.contains(&mount.disk.as_str()) {
                names.push(&mount.disk);
            }
        }

        let disks = names.into_iter().map(|name| Disk {
            name: name.to_string(),
            size_gb: self.config.disk_size_gb,
            disk_type: self.config.disk_type.clone(),
            source_image: if name == WORKING_DISK {
                self.config.disk_image.clone().filter(|i| !i.is_empty())
            } else {
                None
            },
        });
        let disks: Vec<Disk> = disks.collect();
        pipeline.resources.virtual_machine.disks.extend(disks);
    }

    /// Grants the storage scope once if any action uses the SDK image or a
    /// cloud CLI as its first command.
    fn add_required_scope(&self, pipeline: &mut Pipeline) {
        let needs_storage = pipeline.actions.iter().any(|action| {
            action.image_uri == self.config.cloud_sdk_image
                || action.first_command().is_some_and(is_cloud_command)
        });
        if needs_storage {
            pipeline
                .resources
                .virtual_machine
                .service_account
                .scopes
                .push(STORAGE_SCOPE.to_string());
        }
    }
}

/// Compiles the configured job description into a request.
pub async fn compile_request(config: &RunConfig, lister: &dyn LocationLister) -> Result<Request> {
    RequestAssembler::new(config, lister).compile().await
}
