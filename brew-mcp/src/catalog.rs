//! Command catalog — the declarative table of every exposed `brew` subcommand
//!
//! Each [`CommandSpec`] describes one tool: its description, the literal
//! subcommand tokens, positional parameters and flag-style options. The table
//! is loaded once at startup (built in, or from `[[commands]]` in the config
//! file) and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::CatalogError;

/// Shape of a positional parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    StringList,
}

/// Shape of a flag-style option value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    Bool,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSpec {
    pub name: String,
    /// Literal command-line token, e.g. `--force`
    pub flag: String,
    pub kind: OptionKind,
    #[serde(default)]
    pub description: String,
}

/// One catalog entry, mapped to exactly one registered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    /// Subcommand tokens placed right after the binary. Empty means `[name]`.
    #[serde(default)]
    pub base_args: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
}

impl CommandSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            base_args: vec![name.to_string()],
            params: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn with_base_args(mut self, args: &[&str]) -> Self {
        self.base_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn required(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.param(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.param(name, kind, false, description)
    }

    fn param(mut self, name: &str, kind: ParamKind, required: bool, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    /// Boolean option: emits `flag` alone when true
    pub fn switch(self, name: &str, flag: &str, description: &str) -> Self {
        self.option(name, flag, OptionKind::Bool, description)
    }

    /// String option: emits `flag value` when a non-empty value is given
    pub fn value(self, name: &str, flag: &str, description: &str) -> Self {
        self.option(name, flag, OptionKind::String, description)
    }

    fn option(mut self, name: &str, flag: &str, kind: OptionKind, description: &str) -> Self {
        self.options.push(OptionSpec {
            name: name.to_string(),
            flag: flag.to_string(),
            kind,
            description: description.to_string(),
        });
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn option_spec(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|o| o.name == name)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.description.trim().is_empty() {
            return Err(CatalogError::MissingDescription(self.name.clone()));
        }

        let mut seen = HashSet::new();
        let names = self
            .params
            .iter()
            .map(|p| &p.name)
            .chain(self.options.iter().map(|o| &o.name));
        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(CatalogError::DuplicateParameter {
                    command: self.name.clone(),
                    name: name.clone(),
                });
            }
        }

        let mut optional_seen = false;
        for param in &self.params {
            if param.required && optional_seen {
                return Err(CatalogError::RequiredAfterOptional {
                    command: self.name.clone(),
                    param: param.name.clone(),
                });
            }
            optional_seen |= !param.required;
        }

        for option in &self.options {
            if !option.flag.starts_with('-') || option.flag.trim_start_matches('-').is_empty() {
                return Err(CatalogError::InvalidFlag {
                    command: self.name.clone(),
                    name: option.name.clone(),
                    flag: option.flag.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Read-only name → spec mapping, in declaration order
#[derive(Debug)]
pub struct Catalog {
    commands: Vec<Arc<CommandSpec>>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Validate and index a command table
    pub fn new(commands: Vec<CommandSpec>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(commands.len());
        let mut specs = Vec::with_capacity(commands.len());

        for mut spec in commands {
            spec.validate()?;
            if spec.base_args.is_empty() {
                spec.base_args = vec![spec.name.clone()];
            }
            if index.contains_key(&spec.name) {
                return Err(CatalogError::DuplicateCommand(spec.name));
            }
            index.insert(spec.name.clone(), specs.len());
            specs.push(Arc::new(spec));
        }

        Ok(Self {
            commands: specs,
            index,
        })
    }

    /// The built-in Homebrew command table
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(builtin_commands())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<CommandSpec>, CatalogError> {
        self.index
            .get(name)
            .map(|&i| &self.commands[i])
            .ok_or_else(|| CatalogError::UnknownCommand(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandSpec>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Every `brew` subcommand exposed by default
pub fn builtin_commands() -> Vec<CommandSpec> {
    use ParamKind::{String as Str, StringList as List};

    vec![
        CommandSpec::new("install", "Install one or more Homebrew formulae or casks by name.")
            .required("packages", List, "Formula or cask names to install")
            .switch("cask", "--cask", "Treat all named arguments as casks")
            .switch("formula", "--formula", "Treat all named arguments as formulae")
            .switch("force", "--force", "Install without checking for previously installed keg-only or non-migrated versions")
            .switch("build_from_source", "--build-from-source", "Compile from source even if a bottle is available")
            .switch("head", "--HEAD", "Install the HEAD version from the upstream repository")
            .switch("dry_run", "--dry-run", "Show what would be installed without installing anything")
            .switch("verbose", "--verbose", "Print verification and post-install steps"),
        CommandSpec::new("uninstall", "Uninstall one or more Homebrew formulae or casks by name.")
            .required("packages", List, "Formula or cask names to uninstall")
            .switch("cask", "--cask", "Treat all named arguments as casks")
            .switch("formula", "--formula", "Treat all named arguments as formulae")
            .switch("force", "--force", "Delete all installed versions")
            .switch("zap", "--zap", "Remove all files associated with a cask")
            .switch("ignore_dependencies", "--ignore-dependencies", "Do not fail if other installed formulae depend on it"),
        CommandSpec::new("reinstall", "Uninstall and then reinstall Homebrew formulae or casks.")
            .required("packages", List, "Formula or cask names to reinstall")
            .switch("cask", "--cask", "Treat all named arguments as casks")
            .switch("formula", "--formula", "Treat all named arguments as formulae")
            .switch("force", "--force", "Install without checking for previously installed versions")
            .switch("build_from_source", "--build-from-source", "Compile from source even if a bottle is available"),
        CommandSpec::new("upgrade", "Upgrade outdated Homebrew packages, or only the named ones.")
            .optional("packages", List, "Formula or cask names to upgrade; all outdated when omitted")
            .switch("cask", "--cask", "Treat all named arguments as casks")
            .switch("formula", "--formula", "Treat all named arguments as formulae")
            .switch("greedy", "--greedy", "Also upgrade casks with auto_updates or version :latest")
            .switch("dry_run", "--dry-run", "Show what would be upgraded without upgrading anything")
            .switch("force", "--force", "Install without checking for previously installed versions"),
        CommandSpec::new("info", "Fetch information about Homebrew packages.")
            .required("packages", List, "Formula or cask names to describe")
            .switch("cask", "--cask", "Treat all named arguments as casks")
            .switch("formula", "--formula", "Treat all named arguments as formulae")
            .switch("json", "--json=v2", "Print a JSON representation")
            .switch("installed", "--installed", "Describe all installed packages (with json)"),
        CommandSpec::new("search", "Search for Homebrew formulae and casks by name or regex.")
            .required("query", Str, "Text or /regex/ to search for")
            .switch("cask", "--cask", "Only search casks")
            .switch("formula", "--formula", "Only search formulae")
            .switch("desc", "--desc", "Search descriptions as well as names"),
        CommandSpec::new("list", "List installed Homebrew packages.")
            .optional("packages", List, "Only list files for these installed packages")
            .switch("cask", "--cask", "List only casks")
            .switch("formula", "--formula", "List only formulae")
            .switch("versions", "--versions", "Show the version number of each package")
            .switch("pinned", "--pinned", "List only pinned formulae")
            .switch("full_name", "--full-name", "Print fully-qualified names"),
        CommandSpec::new("outdated", "List installed Homebrew packages that have newer versions available.")
            .switch("cask", "--cask", "List only outdated casks")
            .switch("formula", "--formula", "List only outdated formulae")
            .switch("greedy", "--greedy", "Include casks with auto_updates or version :latest")
            .switch("json", "--json=v2", "Print output in JSON format")
            .switch("verbose", "--verbose", "Include detailed version information"),
        CommandSpec::new("doctor", "Check your system for potential Homebrew problems.")
            .switch("verbose", "--verbose", "Print extra debugging information"),
        CommandSpec::new("update", "Fetch the newest version of Homebrew and all formulae.")
            .switch("force", "--force", "Always do a slower, full update check")
            .switch("verbose", "--verbose", "Print the directories checked and git operations performed"),
        CommandSpec::new("cleanup", "Remove stale lock files, outdated downloads and old versions of installed packages.")
            .optional("packages", List, "Only clean up these formulae or casks")
            .value("prune", "--prune", "Remove cache files older than this many days, or 'all'")
            .switch("dry_run", "--dry-run", "Show what would be removed without removing anything")
            .switch("scrub", "-s", "Scrub the cache, including downloads for the latest versions"),
        CommandSpec::new("deps", "Show dependencies for a Homebrew formula.")
            .required("formula", Str, "Formula whose dependencies are listed")
            .switch("tree", "--tree", "Show dependencies as a tree")
            .switch("installed", "--installed", "Only list dependencies that are installed")
            .switch("direct", "--direct", "Show only direct dependencies")
            .switch("include_build", "--include-build", "Include build-time dependencies"),
        CommandSpec::new("uses", "Show installed formulae that depend on a formula.")
            .required("formula", Str, "Formula to look up dependents of")
            .switch("installed", "--installed", "Only list formulae that are currently installed")
            .switch("recursive", "--recursive", "Resolve more than one level of dependencies"),
        CommandSpec::new("leaves", "List installed formulae that are not dependencies of another installed formula.")
            .switch("installed_on_request", "--installed-on-request", "Only list leaves that were manually installed"),
        CommandSpec::new("autoremove", "Uninstall formulae that were only installed as a dependency and are no longer needed.")
            .switch("dry_run", "--dry-run", "List what would be uninstalled without uninstalling"),
        CommandSpec::new("pin", "Pin formulae so they are not upgraded.")
            .required("formulae", List, "Installed formulae to pin"),
        CommandSpec::new("unpin", "Unpin formulae so they can be upgraded again.")
            .required("formulae", List, "Pinned formulae to unpin"),
        CommandSpec::new("tap", "Tap a formula repository, or list tapped repositories when none is given.")
            .optional("repository", Str, "Repository in user/repo form")
            .optional("url", Str, "Custom clone URL for the repository")
            .switch("force", "--force", "Force tapping of a repository"),
        CommandSpec::new("untap", "Remove tapped formula repositories.")
            .required("taps", List, "Repositories in user/repo form")
            .switch("force", "--force", "Untap even if formulae or casks from it are installed"),
        CommandSpec::new("config", "Show Homebrew and system configuration useful for debugging."),
        CommandSpec::new("services_list", "List all services managed by `brew services`.")
            .with_base_args(&["services", "list"])
            .switch("json", "--json", "Print output in JSON format"),
        CommandSpec::new("version", "Print the installed Homebrew version.")
            .with_base_args(&["--version"]),
    ]
}
