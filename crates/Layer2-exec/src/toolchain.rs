//! Toolchain table: extension → compile/run command templates

use orbit_foundation::{OrbitConfig, ToolchainKind, ToolchainSpec};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Extension-keyed toolchain table
#[derive(Debug, Clone)]
pub struct ToolchainTable {
    specs: HashMap<String, ToolchainSpec>,
}

impl Default for ToolchainTable {
    fn default() -> Self {
        let mut specs = HashMap::new();
        specs.insert("js".into(), ToolchainSpec::interpreted(&["node", "{entry}"]));
        specs.insert(
            "py".into(),
            ToolchainSpec::interpreted(&["python3", "-u", "{entry}"]),
        );
        // compile and run fused into one step
        specs.insert(
            "go".into(),
            ToolchainSpec::compiled(None, &["go", "run", "{entry}"]),
        );
        specs.insert(
            "cpp".into(),
            ToolchainSpec::compiled(
                Some(&["g++", "-std=c++17", "{entry}", "-o", "{bin}"]),
                &["{bin}"],
            ),
        );
        specs.insert(
            "c".into(),
            ToolchainSpec::compiled(Some(&["gcc", "{entry}", "-o", "{bin}"]), &["{bin}"]),
        );
        specs.insert(
            "java".into(),
            ToolchainSpec::compiled(
                Some(&["javac", "{entry}"]),
                &["java", "-cp", "{dir}", "{stem}"],
            ),
        );
        Self { specs }
    }
}

impl ToolchainTable {
    /// Built-in table with the config's `toolchains` section layered on top
    pub fn from_config(config: &OrbitConfig) -> Self {
        let mut table = Self::default();
        for (ext, spec) in &config.toolchains {
            table.insert(ext.trim_start_matches('.'), spec.clone());
        }
        table
    }

    pub fn insert(&mut self, ext: impl Into<String>, spec: ToolchainSpec) {
        self.specs.insert(ext.into().to_ascii_lowercase(), spec);
    }

    pub fn get(&self, ext: &str) -> Option<&ToolchainSpec> {
        self.specs.get(&ext.to_ascii_lowercase())
    }

    pub fn kind(&self, ext: &str) -> Option<ToolchainKind> {
        self.get(ext).map(|spec| spec.kind)
    }

    /// Known extensions, sorted
    pub fn extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }
}

// ============================================================================
// Template expansion
// ============================================================================

/// Values substituted into command templates
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub entry: PathBuf,
    pub stem: String,
    pub dir: PathBuf,
    pub workspace: PathBuf,
    pub bin: PathBuf,
}

impl TemplateVars {
    /// Variables for `entry` (a host path inside `workspace`)
    pub fn new(workspace: &Path, entry: &Path) -> Self {
        let stem = entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        let dir = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workspace.to_path_buf());
        let bin_name = if cfg!(windows) {
            format!("{}.exe", stem)
        } else {
            stem.clone()
        };
        Self {
            entry: entry.to_path_buf(),
            bin: dir.join(bin_name),
            stem,
            dir,
            workspace: workspace.to_path_buf(),
        }
    }

    pub fn expand(&self, arg: &str) -> String {
        arg.replace("{entry}", &self.entry.to_string_lossy())
            .replace("{stem}", &self.stem)
            .replace("{dir}", &self.dir.to_string_lossy())
            .replace("{workspace}", &self.workspace.to_string_lossy())
            .replace("{bin}", &self.bin.to_string_lossy())
    }

    /// Expand a whole argv template
    pub fn expand_all(&self, template: &[String]) -> Vec<String> {
        template.iter().map(|arg| self.expand(arg)).collect()
    }
}
