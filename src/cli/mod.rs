//! RB-060: CLI subcommands: init, run and inspect.
//!
//! Settings come from an optional `rbox.yaml` next to the working directory;
//! flags given on the command line take precedence over file values.

use crate::core::env::Capabilities;
use crate::core::error::Error;
use crate::core::loader::DirResolver;
use crate::core::script::{Script, ScriptOptions};
use crate::lang::parser::report;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_FILE: &str = "rbox.yaml";
pub const DEFAULT_SCRIPT: &str = "build.box";

/// Entrypoints reported by `inspect`.
const ENTRYPOINTS: &[&str] = &["setup", "build", "fallback_template"];

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter rbox.yaml and build script
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Execute a build script against a base image
    Run {
        #[command(flatten)]
        target: Target,

        /// Path to the base image file
        #[arg(long)]
        img: Option<String>,

        /// Call this entrypoint and print its result instead of setup/build
        #[arg(long)]
        call: Option<String>,

        /// Arguments passed to the script (after `--`)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Load a script without running entrypoints and describe it as JSON
    Inspect {
        #[command(flatten)]
        target: Target,
    },
}

/// Flags shared by the commands that load a script.
#[derive(clap::Args, Debug, Default)]
pub struct Target {
    /// Path to rbox.yaml (default: ./rbox.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the box build file
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Extra directory searched by load() (repeatable)
    #[arg(short = 'I', long = "module-dir")]
    pub module_dirs: Vec<PathBuf>,

    /// Directory partitions are mounted under
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Contents of `rbox.yaml`. Relative paths are relative to the file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub script: Option<PathBuf>,
    pub img: Option<String>,
    pub verbose: bool,
    pub module_dirs: Vec<PathBuf>,
    pub staging_dir: Option<PathBuf>,
}

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub script: PathBuf,
    pub img: Option<String>,
    pub verbose: bool,
    pub module_dirs: Vec<PathBuf>,
    pub staging_dir: PathBuf,
}

/// Parse a config file, resolving its relative paths against its directory.
pub fn parse_config_file(path: &Path) -> Result<RunConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let mut config: RunConfig = serde_yaml_ng::from_str(&text)
        .map_err(|e| format!("invalid {}: {}", path.display(), e))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.script = config.script.map(|p| base.join(p));
    config.module_dirs = config.module_dirs.iter().map(|d| base.join(d)).collect();
    config.staging_dir = config.staging_dir.map(|p| base.join(p));
    Ok(config)
}

/// Load the explicit config, or `./rbox.yaml` if it exists, or defaults.
fn load_config(explicit: Option<&Path>) -> Result<RunConfig, String> {
    match explicit {
        Some(path) => parse_config_file(path),
        None if Path::new(CONFIG_FILE).is_file() => parse_config_file(Path::new(CONFIG_FILE)),
        None => Ok(RunConfig::default()),
    }
}

/// Merge flags over file values. Flag module dirs are searched first; the
/// script's own directory is always searched last.
pub fn merge(config: RunConfig, target: &Target, img: Option<String>, verbose: bool) -> Settings {
    let script = target
        .script
        .clone()
        .or(config.script)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT));
    let mut module_dirs: Vec<PathBuf> = target.module_dirs.clone();
    module_dirs.extend(config.module_dirs);
    let script_dir = match script.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !module_dirs.contains(&script_dir) {
        module_dirs.push(script_dir);
    }
    Settings {
        script,
        img: img.or(config.img).filter(|s| !s.is_empty()),
        verbose: verbose || config.verbose,
        module_dirs,
        staging_dir: target
            .staging_dir
            .clone()
            .or(config.staging_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("rbox")),
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, verbose: bool) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Run {
            target,
            img,
            call,
            args,
        } => {
            let config = load_config(target.config.as_deref())?;
            let settings = merge(config, &target, img, verbose);
            cmd_run(&settings, call.as_deref(), &args)
        }
        Commands::Inspect { target } => {
            let config = load_config(target.config.as_deref())?;
            let settings = merge(config, &target, None, verbose);
            let report = cmd_inspect(&settings)?;
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("cannot encode report: {}", e))?;
            println!("{}", json);
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    let script_path = path.join(DEFAULT_SCRIPT);
    if script_path.exists() {
        return Err(format!("{} already exists", script_path.display()));
    }

    let config = r#"script: build.box
img: ""
verbose: false
module_dirs: []
"#;
    let script = r#"load("pi.lib", "pi")

def setup(img):
    return pi.load_img(img)

def build(image):
    pi.configure_hostname(image, "raspberrypi")
    pi.enable_ssh(image)
"#;
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&config_path, config)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;
    std::fs::write(&script_path, script)
        .map_err(|e| format!("cannot write {}: {}", script_path.display(), e))?;

    println!("Initialized rbox project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", script_path.display());
    Ok(())
}

fn read_script(path: &Path) -> Result<String, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("cannot load script {}: {}", path.display(), e))?;
    if meta.is_dir() {
        return Err(format!("{} is a directory", path.display()));
    }
    std::fs::read_to_string(path).map_err(|e| format!("cannot load script {}: {}", path.display(), e))
}

fn open_script(settings: &Settings, source: &str, args: &[String]) -> Result<Script, String> {
    let options = ScriptOptions {
        verbose: settings.verbose,
        capabilities: Capabilities::staging(&settings.staging_dir),
        ..ScriptOptions::default()
    };
    let name = settings.script.display().to_string();
    Script::new(
        source,
        &name,
        Box::new(DirResolver::new(settings.module_dirs.clone())),
        args,
        options,
    )
    .map_err(|e| {
        if let Error::Syntax { file, .. } = &e {
            if *file == name {
                if let Some(snippet) = report(source, &e) {
                    eprint!("{}", snippet);
                }
            }
        }
        format!("initialization failed: {}", e)
    })
}

fn run_entrypoints(script: &mut Script, img: Option<&str>, call: Option<&str>) -> Result<(), String> {
    if let Some(name) = call {
        let out = script.invoke_named(name).map_err(|e| e.to_string())?;
        println!("{}", out);
        return Ok(());
    }
    let template = match img {
        Some(img) => img.to_string(),
        None => script
            .invoke_named("fallback_template")
            .map_err(|e| e.to_string())?,
    };
    info!(script = script.name(), img = %template, "running build");
    script.invoke_setup(&template).map_err(|e| e.to_string())?;
    script.invoke_build().map_err(|e| e.to_string())
}

fn cmd_run(settings: &Settings, call: Option<&str>, args: &[String]) -> Result<(), String> {
    let source = read_script(&settings.script)?;
    let mut script = open_script(settings, &source, args)?;
    let result = run_entrypoints(&mut script, settings.img.as_deref(), call);
    let closed = script.close().map_err(|e| format!("close failed: {}", e));
    result.and(closed)
}

/// What `inspect` prints.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InspectReport {
    pub script: String,
    pub source_hash: String,
    pub globals: Vec<String>,
    pub entrypoints: Vec<String>,
    pub modules: Vec<String>,
    pub open_resources: usize,
}

fn cmd_inspect(settings: &Settings) -> Result<InspectReport, String> {
    let source = read_script(&settings.script)?;
    let mut script = open_script(settings, &source, &[])?;
    let report = InspectReport {
        script: script.name().to_string(),
        source_hash: crate::core::hasher::hash_string(&source),
        globals: script.globals(),
        entrypoints: script.entrypoints(ENTRYPOINTS),
        modules: script.loaded_modules(),
        open_resources: script.open_resources(),
    };
    script.close().map_err(|e| format!("close failed: {}", e))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dir: &Path, script: &str) -> Settings {
        let path = dir.join("build.box");
        std::fs::write(&path, script).unwrap();
        merge(
            RunConfig::default(),
            &Target {
                script: Some(path),
                staging_dir: Some(dir.join("staging")),
                ..Target::default()
            },
            None,
            false,
        )
    }

    #[test]
    fn test_cli_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("project");
        cmd_init(&sub).unwrap();
        assert!(sub.join(CONFIG_FILE).is_file());
        assert!(sub.join(DEFAULT_SCRIPT).is_file());
        let config = parse_config_file(&sub.join(CONFIG_FILE)).unwrap();
        assert_eq!(config.script, Some(sub.join("build.box")));
        assert!(cmd_init(&sub).is_err());
    }

    #[test]
    fn test_cli_config_paths_are_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "script: boxes/pi.box\nimg: base.img\nverbose: true\nmodule_dirs: [lib]\nstaging_dir: mnt\n",
        )
        .unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.script, Some(dir.path().join("boxes/pi.box")));
        assert_eq!(config.module_dirs, vec![dir.path().join("lib")]);
        assert_eq!(config.staging_dir, Some(dir.path().join("mnt")));
        assert!(config.verbose);
    }

    #[test]
    fn test_cli_config_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "scirpt: typo.box\n").unwrap();
        let err = parse_config_file(&path).unwrap_err();
        assert!(err.contains("scirpt"), "{}", err);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let config = RunConfig {
            script: Some(PathBuf::from("/cfg/build.box")),
            img: Some("cfg.img".into()),
            verbose: false,
            module_dirs: vec![PathBuf::from("/cfg/lib")],
            staging_dir: Some(PathBuf::from("/cfg/mnt")),
        };
        let target = Target {
            config: None,
            script: Some(PathBuf::from("/flag/x.box")),
            module_dirs: vec![PathBuf::from("/flag/lib")],
            staging_dir: None,
        };
        let s = merge(config, &target, Some("flag.img".into()), true);
        assert_eq!(s.script, PathBuf::from("/flag/x.box"));
        assert_eq!(s.img.as_deref(), Some("flag.img"));
        assert!(s.verbose);
        assert_eq!(
            s.module_dirs,
            vec![
                PathBuf::from("/flag/lib"),
                PathBuf::from("/cfg/lib"),
                PathBuf::from("/flag"),
            ]
        );
        assert_eq!(s.staging_dir, PathBuf::from("/cfg/mnt"));
    }

    #[test]
    fn test_cli_defaults() {
        let s = merge(RunConfig::default(), &Target::default(), Some(String::new()), false);
        assert_eq!(s.script, PathBuf::from(DEFAULT_SCRIPT));
        assert_eq!(s.img, None);
        assert_eq!(s.module_dirs, vec![PathBuf::from(".")]);
    }

    #[test]
    fn test_cli_run_setup_and_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(
            dir.path(),
            "def setup(img):\n    return img + '!'\n\ndef build(v):\n    if v != 'base.img!':\n        crash('got ' + str(v))\n",
        );
        s.img = Some("base.img".into());
        cmd_run(&s, None, &[]).unwrap();
    }

    #[test]
    fn test_cli_run_uses_fallback_template() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(
            dir.path(),
            "def fallback_template():\n    return 'from-script.img'\n\ndef setup(img):\n    if img != 'from-script.img':\n        crash('wrong template ' + img)\n\ndef build(v):\n    pass\n",
        );
        cmd_run(&s, None, &[]).unwrap();
    }

    #[test]
    fn test_cli_run_reports_failing_entrypoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "def build(v):\n    crash('boom')\n");
        s.img = Some("base.img".into());
        let err = cmd_run(&s, None, &[]).unwrap_err();
        assert_eq!(err, "build() failed: soft crash: boom");

        let s = settings(dir.path(), "x = 1\n");
        let err = cmd_run(&s, None, &[]).unwrap_err();
        assert_eq!(err, "fallback_template() function not present");
    }

    #[test]
    fn test_cli_run_rejects_undefined_flags() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path(), "def build(v):\n    pass\n");
        let err = cmd_run(&s, None, &["--force".to_string()]).unwrap_err();
        assert_eq!(err, "initialization failed: flag provided but not defined: -force");
    }

    #[test]
    fn test_cli_run_named_call() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path(), "def version():\n    return 'v' + args.arg(0)\n");
        cmd_run(&s, Some("version"), &["3".to_string()]).unwrap();
        let err = cmd_run(&s, Some("missing"), &[]).unwrap_err();
        assert!(err.contains("missing() function not present"), "{}", err);
    }

    #[test]
    fn test_cli_script_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path(), "");
        s.script = dir.path().to_path_buf();
        assert!(cmd_run(&s, None, &[]).unwrap_err().contains("is a directory"));
        s.script = dir.path().join("absent.box");
        assert!(cmd_run(&s, None, &[]).unwrap_err().contains("cannot load script"));
    }

    #[test]
    fn test_cli_inspect_report() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("helpers.star"), "greeting = 'hi'\n").unwrap();
        let s = settings(
            dir.path(),
            "load('helpers.star', 'greeting')\nload('unix.lib', 'unix')\n\ndef setup(img):\n    return img\n\ndef build(v):\n    pass\n",
        );
        let report = cmd_inspect(&s).unwrap();
        assert_eq!(report.globals, ["greeting", "unix", "setup", "build"]);
        assert_eq!(report.entrypoints, ["setup", "build"]);
        assert_eq!(report.modules, ["helpers.star", "unix.lib"]);
        assert_eq!(report.open_resources, 0);
        assert!(report.source_hash.starts_with("blake3:"));

        let json = serde_json::to_string(&report).unwrap();
        let back: InspectReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
