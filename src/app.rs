use std::error::Error;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::activation::{self, ActivationScore};
use crate::audit::{now_utc_rfc3339, AuditError, AuditEvent, AuditEventKind, AuditLog, AUDIT_FILE};
use crate::config::{Config, ConfigError, CONFIG_FILE};
use crate::detect::{fuzzy, DetectionContext};
use crate::doctor::{self, DoctorReport};
use crate::domain::{normalize_alias, ProjectRecord};
use crate::git::{GitAdapter, GitError};
use crate::interactive::{
    self, InteractiveError, SelectionChoice, SelectionOutcome, SelectionPrompt,
};
use crate::project_id::generate_project_id;
use crate::registry::discovery::{discover_projects, DiscoveredProject};
use crate::registry::{ProjectPatch, Registry, RegistryError, RegistryStore, REGISTRY_FILE};
use crate::resolver::{self, ResolutionResult, ResolutionStatus};
use crate::safeguard::{self, SafeguardReport};
use crate::validator::{
    self, AmbiguousProjectError, BlockReason, OperationDescriptor, ProjectMismatchError,
    ValidationOutcome,
};

/// Facade over the registry, detectors, resolver, validator and audit log.
/// Nothing outside this type touches the registry or audit files.
pub struct App {
    home: PathBuf,
    config: Config,
    store: RegistryStore,
    audit: AuditLog,
    git: GitAdapter,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub id: Option<String>,
    pub name: String,
    pub root: PathBuf,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub git_remote: Option<String>,
    /// Read `origin` from the root when no remote is given.
    pub detect_remote: bool,
    pub markers: Vec<String>,
}

impl App {
    pub fn open(home: impl Into<PathBuf>) -> Result<Self, AppError> {
        let home = home.into();
        let config = Config::load(&home.join(CONFIG_FILE))?;
        Ok(Self::with_config(home, config))
    }

    pub fn with_config(home: impl Into<PathBuf>, config: Config) -> Self {
        let home = home.into();
        Self {
            store: RegistryStore::new(home.join(REGISTRY_FILE)),
            audit: AuditLog::new(home.join(AUDIT_FILE)),
            git: GitAdapter::new(),
            config,
            home,
        }
    }

    pub fn add_project(&self, input: NewProject) -> Result<ProjectRecord, AppError> {
        let registry = self.load_registry()?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidArgument(
                "project name cannot be empty".to_string(),
            ));
        }
        let id = match input.id {
            Some(id) => id.trim().to_string(),
            None => generate_project_id(&name, |candidate| registry.get(candidate).is_some()),
        };
        let git_remote = match input.git_remote {
            Some(remote) => Some(remote),
            None if input.detect_remote => self.root_remote(&input.root),
            None => None,
        };
        let record = ProjectRecord {
            id,
            name,
            root: input.root,
            aliases: input.aliases.into_iter().collect(),
            description: input.description,
            tags: input.tags,
            git_remote,
            markers: input.markers,
            created_at: now_utc_rfc3339(),
            last_used_at: None,
        };
        let stored = self.store.add_project(record)?;
        tracing::info!(project = %stored.id, root = %stored.root.display(), "project added");
        Ok(stored)
    }

    pub fn update_project(
        &self,
        reference: &str,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, AppError> {
        let id = self.require_project(reference)?.id;
        Ok(self.store.update_project(&id, patch)?)
    }

    pub fn remove_project(&self, reference: &str) -> Result<ProjectRecord, AppError> {
        let id = self.require_project(reference)?.id;
        Ok(self.store.remove_project(&id)?)
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRecord>, AppError> {
        self.audited(self.store.list_projects())
    }

    /// Id, name, or alias; `NotFound` otherwise.
    pub fn require_project(&self, reference: &str) -> Result<ProjectRecord, AppError> {
        self.audited(self.store.find_by_reference(reference))?
            .ok_or_else(|| AppError::NotFound(reference.trim().to_string()))
    }

    pub fn active_project(&self) -> Result<Option<ProjectRecord>, AppError> {
        self.audited(self.store.get_active_project())
    }

    pub fn clear_active_project(&self) -> Result<(), AppError> {
        Ok(self.store.set_active_project(None)?)
    }

    /// Exact reference first; otherwise fuzzy lookalikes are reported as an
    /// ambiguity instead of being picked automatically.
    pub fn switch_project(&self, reference: &str) -> Result<ProjectRecord, AppError> {
        let registry = self.load_registry()?;
        let Some(target) = registry.find_by_reference(reference).cloned() else {
            let mut candidates = fuzzy::fuzzy_name(reference, &registry, &self.config.detectors);
            if candidates.is_empty() {
                return Err(AppError::NotFound(reference.trim().to_string()));
            }
            candidates.sort_by(crate::domain::rank_order);
            return Err(AppError::Ambiguous(AmbiguousProjectError { candidates }));
        };

        let previous = registry.active_project_id.clone();
        self.store.set_active_project(Some(&target.id))?;
        self.record_audit(&AuditEvent::new(
            AuditEventKind::ProjectSwitch,
            Some(target.id.clone()),
            json!({
                "from": previous,
                "to": target.id,
                "reference": reference.trim(),
                "registry_fingerprint": registry.fingerprint(),
            }),
            "switched",
        ))?;
        tracing::info!(project = %target.id, "active project switched");
        Ok(target)
    }

    /// Fills the git remote from `cwd` when the caller did not supply one.
    pub fn build_context(
        &self,
        cwd: Option<PathBuf>,
        mention: Option<String>,
        document: Option<String>,
        expected: Option<String>,
    ) -> DetectionContext {
        let git_remote = cwd.as_deref().and_then(|cwd| self.origin_remote(cwd));
        DetectionContext {
            cwd,
            mention,
            document,
            git_remote,
            expected,
        }
    }

    pub fn resolve(&self, context: &DetectionContext) -> Result<ResolutionResult, AppError> {
        let registry = self.load_registry()?;
        let result = resolver::resolve(context, &registry, &self.config);

        let kind = match result.status {
            ResolutionStatus::Resolved => AuditEventKind::ContextCheck,
            ResolutionStatus::Mismatch => AuditEventKind::MismatchWarning,
            ResolutionStatus::Ambiguous => AuditEventKind::AmbiguousWarning,
            ResolutionStatus::None => AuditEventKind::NoProjectDetected,
        };
        self.record_audit(&AuditEvent::new(
            kind,
            result.best_project_id().map(str::to_string),
            json!({
                "operation": "resolve",
                "cwd": context.cwd.as_ref().map(|cwd| cwd.display().to_string()),
                "mention": context.mention,
                "expected": result.expected,
                "confidence": result.confidence(),
                "matched_via": result.best_candidate.as_ref().map(|best| best.matched_via.as_str()),
                "candidates": result.all_candidates.len(),
                "warnings": result.warnings,
                "registry_fingerprint": registry.fingerprint(),
            }),
            result.status.as_str(),
        ))?;

        if let Some(id) = result.best_project_id().filter(|_| result.is_resolved()) {
            self.store.touch_last_used(id)?;
        }
        Ok(result)
    }

    pub fn validate(
        &self,
        result: &ResolutionResult,
        operation: &OperationDescriptor,
    ) -> Result<ValidationOutcome, AppError> {
        let registry = self.load_registry()?;
        let report = self.safeguard_report()?;
        let outcome = validator::validate(
            result,
            operation,
            &registry,
            &report,
            &self.config.resolver,
        );

        let kind = if outcome.mismatch.is_some() && result.status != ResolutionStatus::Mismatch {
            AuditEventKind::MismatchWarning
        } else {
            AuditEventKind::ContextCheck
        };
        self.record_audit(&AuditEvent::new(
            kind,
            result.best_project_id().map(str::to_string),
            json!({
                "operation": operation.kind.as_str(),
                "claimed_project": operation.claimed_project,
                "override_confirmations": operation.override_confirmations,
                "status": result.status.as_str(),
                "confidence": result.confidence(),
                "warnings": outcome.warnings,
                "block": outcome.block.as_ref().map(|block| json!({
                    "explanation": block.explanation,
                    "remedy": block.remedy,
                    "required_confirmations": block.required_confirmations,
                })),
                "safeguard_flags": report.flags,
                "registry_fingerprint": registry.fingerprint(),
            }),
            outcome.decision.as_str(),
        ))?;
        Ok(outcome)
    }

    /// Resolve then validate, the usual caller path.
    pub fn check(
        &self,
        context: &DetectionContext,
        operation: &OperationDescriptor,
    ) -> Result<(ResolutionResult, ValidationOutcome), AppError> {
        let result = self.resolve(context)?;
        let outcome = self.validate(&result, operation)?;
        Ok((result, outcome))
    }

    /// A definite project or an error carrying why there is none.
    pub fn require_resolved(&self, result: &ResolutionResult) -> Result<ProjectRecord, AppError> {
        match result.status {
            ResolutionStatus::Resolved => {
                let id = result.best_project_id().unwrap_or_default();
                self.audited(self.store.get_project(id))
            }
            ResolutionStatus::Ambiguous => Err(AppError::Ambiguous(AmbiguousProjectError {
                candidates: result.contenders.clone(),
            })),
            ResolutionStatus::Mismatch => Err(AppError::Mismatch(ProjectMismatchError {
                expected: result
                    .expected
                    .as_ref()
                    .map(|expected| expected.label.clone())
                    .unwrap_or_default(),
                detected: result.best_project_id().unwrap_or_default().to_string(),
                confidence: result.confidence(),
            })),
            ResolutionStatus::None => Err(AppError::NoProject),
        }
    }

    pub fn record_audit(&self, event: &AuditEvent) -> Result<(), AppError> {
        Ok(self.audit.append(event)?)
    }

    pub fn recent_audit(
        &self,
        limit: usize,
        kind: Option<AuditEventKind>,
    ) -> Result<Vec<AuditEvent>, AppError> {
        let mut events = self.audit.read_all()?;
        if let Some(kind) = kind {
            events.retain(|event| event.event_type == kind);
        }
        let start = events.len().saturating_sub(limit);
        Ok(events.split_off(start))
    }

    pub fn safeguard_report(&self) -> Result<SafeguardReport, AppError> {
        let events = self.audit.recent(self.config.safeguard.window_entries)?;
        Ok(safeguard::evaluate(
            &events,
            &self.config.safeguard,
            OffsetDateTime::now_utc(),
        ))
    }

    pub fn interactive_prompt(
        &self,
        result: &ResolutionResult,
    ) -> Result<SelectionPrompt, AppError> {
        let registry = self.load_registry()?;
        Ok(interactive::interactive_prompt(result, &registry))
    }

    /// Applies a selection; with `learn`, the disambiguating text becomes an
    /// alias of the chosen project.
    pub fn run_interactive_resolution(
        &self,
        result: &ResolutionResult,
        choice: &SelectionChoice,
        learn: Option<&str>,
    ) -> Result<SelectionOutcome, AppError> {
        let mut outcome = interactive::apply_choice(result, choice)?;
        if let SelectionOutcome::Resolved {
            result: resolved,
            learned_alias,
        } = &mut outcome
        {
            let id = resolved.best_project_id().unwrap_or_default().to_string();
            if let Some(alias) = learn.and_then(normalize_alias) {
                match self.store.find_by_alias(&alias)? {
                    Some(owner) if owner.id != id => tracing::warn!(
                        alias = %alias,
                        owner = %owner.id,
                        "alias belongs to another project; not learned"
                    ),
                    _ => {
                        if self.store.add_alias(&id, &alias)? {
                            tracing::info!(project = %id, alias = %alias, "alias learned");
                            *learned_alias = Some(alias);
                        }
                    }
                }
            }
            self.store.touch_last_used(&id)?;
        }

        let (project_id, answer, learned) = match &outcome {
            SelectionOutcome::Resolved {
                result,
                learned_alias,
            } => (
                result.best_project_id().map(str::to_string),
                "selected",
                learned_alias.clone(),
            ),
            SelectionOutcome::CreateNew => (None, "create_new", None),
            SelectionOutcome::Cancelled(_) => (None, "cancelled", None),
        };
        self.record_audit(&AuditEvent::new(
            AuditEventKind::ConfirmationResult,
            project_id,
            json!({
                "prompt": "project_selection",
                "contenders": result.contenders.len(),
                "learned_alias": learned,
            }),
            answer,
        ))?;
        Ok(outcome)
    }

    /// Terminal driver around `run_interactive_resolution`.
    pub fn select_interactively<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        result: &ResolutionResult,
        learn: Option<&str>,
    ) -> Result<SelectionOutcome, AppError> {
        let prompt = self.interactive_prompt(result)?;
        self.record_prompt_shown("project_selection", result.best_project_id(), json!({
            "options": prompt
                .options
                .iter()
                .map(|option| option.project_id.as_str())
                .collect::<Vec<_>>(),
        }))?;
        let choice = interactive::prompt_selection(input, output, &prompt)?;
        self.run_interactive_resolution(result, &choice, learn)
    }

    /// Confirmations given for a mismatch override, both prompt and answer
    /// audited.
    pub fn confirm_override_interactively<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
        block: &BlockReason,
    ) -> Result<u8, AppError> {
        self.record_prompt_shown("mismatch_override", None, json!({
            "explanation": block.explanation,
            "required_confirmations": block.required_confirmations,
        }))?;
        let given = interactive::confirm_override(input, output, block)?;
        let confirmed = given >= block.required_confirmations && given > 0;
        self.record_audit(&AuditEvent::new(
            AuditEventKind::ConfirmationResult,
            None,
            json!({
                "prompt": "mismatch_override",
                "confirmations": given,
                "required_confirmations": block.required_confirmations,
            }),
            if confirmed { "confirmed" } else { "declined" },
        ))?;
        Ok(given)
    }

    pub fn doctor(&self) -> DoctorReport {
        doctor::run_doctor(
            &self.home.join(CONFIG_FILE),
            &self.store,
            &self.audit,
            OffsetDateTime::now_utc(),
        )
    }

    /// With `apply`, every new candidate is registered; skipped ones are
    /// returned untouched.
    pub fn discover(
        &self,
        base: &Path,
        max_depth: usize,
        apply: bool,
    ) -> Result<Vec<DiscoveredProject>, AppError> {
        let registry = self.load_registry()?;
        let found = discover_projects(base, max_depth, &self.config.detectors.markers, &registry)?;
        if apply {
            for project in found.iter().filter(|project| project.is_new()) {
                self.add_project(NewProject {
                    id: Some(project.id.clone()),
                    name: project.name.clone(),
                    root: project.root.clone(),
                    detect_remote: true,
                    ..NewProject::default()
                })?;
            }
        }
        Ok(found)
    }

    pub fn should_check(&self, text: &str) -> ActivationScore {
        activation::score(text, &self.config.activation)
    }

    fn record_prompt_shown(
        &self,
        prompt: &str,
        project_id: Option<&str>,
        mut details: Value,
    ) -> Result<(), AppError> {
        if let Some(map) = details.as_object_mut() {
            map.insert("prompt".to_string(), Value::String(prompt.to_string()));
        }
        self.record_audit(&AuditEvent::new(
            AuditEventKind::ConfirmationPromptShown,
            project_id.map(str::to_string),
            details,
            "shown",
        ))
    }

    /// Only a root that is itself a work tree top level contributes its remote.
    fn root_remote(&self, dir: &Path) -> Option<String> {
        match self.git.toplevel(dir) {
            Ok(top) if same_dir(&top, dir) => {}
            Ok(top) => {
                tracing::debug!(
                    dir = %dir.display(),
                    toplevel = %top.display(),
                    "root is nested in another work tree; remote not inherited"
                );
                return None;
            }
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "not a git work tree");
                return None;
            }
        }
        self.origin_remote(dir)
    }

    fn origin_remote(&self, dir: &Path) -> Option<String> {
        match self.git.remote_url(dir, "origin") {
            Ok(remote) => remote,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "git remote unavailable");
                None
            }
        }
    }

    fn load_registry(&self) -> Result<Registry, AppError> {
        self.audited(self.store.load())
    }

    /// An untrusted registry is audited before the error is returned.
    fn audited<T>(&self, loaded: Result<T, RegistryError>) -> Result<T, AppError> {
        match loaded {
            Ok(value) => Ok(value),
            Err(RegistryError::Validation(err)) => {
                let event = AuditEvent::new(
                    AuditEventKind::ValidationError,
                    None,
                    json!({
                        "context": err.context,
                        "issues": err.issues,
                    }),
                    "untrusted",
                );
                if let Err(audit_err) = self.audit.append(&event) {
                    tracing::warn!(error = %audit_err, "could not audit registry validation failure");
                }
                Err(AppError::Registry(RegistryError::Validation(err)))
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    Registry(RegistryError),
    Audit(AuditError),
    Config(ConfigError),
    Git(GitError),
    Interactive(InteractiveError),
    Ambiguous(AmbiguousProjectError),
    Mismatch(ProjectMismatchError),
    NoProject,
    InvalidArgument(String),
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "I/O error: {}", err),
            AppError::Registry(err) => write!(f, "{}", err),
            AppError::Audit(err) => write!(f, "audit error: {}", err),
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Git(err) => write!(f, "git error: {}", err),
            AppError::Interactive(err) => write!(f, "{}", err),
            AppError::Ambiguous(err) => write!(f, "{}", err),
            AppError::Mismatch(err) => write!(f, "{}", err),
            AppError::NoProject => write!(f, "no registered project matches the current context"),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
            AppError::NotFound(reference) => {
                write!(f, "project '{}' not found in registry", reference)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            AppError::Registry(err) => Some(err),
            AppError::Audit(err) => Some(err),
            AppError::Config(err) => Some(err),
            AppError::Git(err) => Some(err),
            AppError::Interactive(err) => Some(err),
            AppError::Ambiguous(err) => Some(err),
            AppError::Mismatch(err) => Some(err),
            AppError::NoProject => None,
            AppError::InvalidArgument(_) => None,
            AppError::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::Io(value)
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        AppError::Registry(value)
    }
}

impl From<AuditError> for AppError {
    fn from(value: AuditError) -> Self {
        AppError::Audit(value)
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<GitError> for AppError {
    fn from(value: GitError) -> Self {
        AppError::Git(value)
    }
}

impl From<InteractiveError> for AppError {
    fn from(value: InteractiveError) -> Self {
        AppError::Interactive(value)
    }
}
