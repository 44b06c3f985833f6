//! Project configuration handling.
//!
//! `sooners.toml` names the databases (with exactly one `default_db`), the
//! components (with their roots and model declarations) and the milestones
//! directory. Everything the engine needs is built once from this file and
//! passed in explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;

use sooners_migrate::bookkeeping::core_models;
use sooners_migrate::dialect::SqlDialect;
use sooners_migrate::error::{MigrateResult, MigrationError};
use sooners_migrate::store::{DatabaseSession, EngineConfig};
use sooners_schema::Component;
use sooners_schema::model::TableDef;
use sooners_sqlite::SqliteSession;

/// Default config file name (lives in the project root)
pub const CONFIG_FILE_NAME: &str = "sooners.toml";

/// Model declaration file name (relative to a component root)
pub const MODELS_FILE_NAME: &str = "models.toml";

/// One configured database.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseEntry {
    /// Database name, used everywhere the engine addresses it.
    pub name: String,
    /// Backend kind: `sqlite`, `mysql` or `postgres`.
    pub kind: String,
    /// File path for sqlite databases.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// The unique database holding configuration and version bookkeeping.
    #[serde(default)]
    pub default_db: bool,
}

/// One configured component.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentEntry {
    /// Unique component name.
    pub name: String,
    /// Component root directory (holds `history/` and `models.toml`).
    pub root: PathBuf,
    /// Built-in component: models come from the engine, not a file.
    #[serde(default)]
    pub builtin: bool,
    /// Vendored (not owned by this repository).
    #[serde(default)]
    pub vendored: bool,
}

/// Milestones section.
#[derive(Debug, Clone, Deserialize)]
pub struct MilestonesEntry {
    /// Directory of milestone definition files.
    pub dir: PathBuf,
}

impl Default for MilestonesEntry {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("milestones"),
        }
    }
}

/// The parsed project configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Databases, in declaration order.
    #[serde(rename = "database")]
    pub databases: Vec<DatabaseEntry>,
    /// Components, in installation order.
    #[serde(rename = "component")]
    pub components: Vec<ComponentEntry>,
    /// Milestones section.
    #[serde(default)]
    pub milestones: MilestonesEntry,
}

/// The models file inside a component root.
#[derive(Debug, Clone, Deserialize)]
struct ModelsFile {
    #[serde(default, rename = "table")]
    tables: Vec<TableDef>,
}

impl Config {
    /// Load the configuration from a file.
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            MigrationError::config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Config = toml::from_str(&text)
            .map_err(|err| MigrationError::config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> MigrateResult<()> {
        let defaults: Vec<&DatabaseEntry> = self
            .databases
            .iter()
            .filter(|database| database.default_db)
            .collect();
        if defaults.len() != 1 {
            return Err(MigrationError::config(format!(
                "exactly one database must set default_db, found {}",
                defaults.len()
            )));
        }
        for database in &self.databases {
            if SqlDialect::from_name(&database.kind).is_none() {
                return Err(MigrationError::config(format!(
                    "database '{}': unknown kind {:?}",
                    database.name, database.kind
                )));
            }
        }
        Ok(())
    }

    /// The name of the default database, when exactly one is declared.
    pub fn default_database(&self) -> Option<&str> {
        self.databases
            .iter()
            .find(|database| database.default_db)
            .map(|database| database.name.as_str())
    }

    /// Build the engine configuration. Paths resolve relative to
    /// `base_dir` (the config file's directory).
    pub fn engine_config(&self, base_dir: &Path) -> MigrateResult<EngineConfig> {
        let default_database = self
            .default_database()
            .ok_or_else(|| MigrationError::config("no database sets default_db"))?
            .to_string();
        let mut databases = BTreeMap::new();
        for database in &self.databases {
            let dialect = SqlDialect::from_name(&database.kind).ok_or_else(|| {
                MigrationError::config(format!(
                    "database '{}': unknown kind {:?}",
                    database.name, database.kind
                ))
            })?;
            databases.insert(database.name.clone(), dialect);
        }
        let mut components = IndexMap::new();
        for entry in &self.components {
            let component = Component::new(
                SmolStr::new(&entry.name),
                base_dir.join(&entry.root),
                !entry.vendored,
            );
            components.insert(SmolStr::new(&entry.name), component);
        }
        Ok(EngineConfig {
            default_database,
            databases,
            components,
            milestones_dir: base_dir.join(&self.milestones.dir),
        })
    }

    /// Open one live session per database. Only the sqlite backend ships
    /// with this CLI; other kinds come from their own server deployments.
    pub fn open_sessions(
        &self,
        base_dir: &Path,
    ) -> MigrateResult<BTreeMap<String, Box<dyn DatabaseSession>>> {
        let mut sessions: BTreeMap<String, Box<dyn DatabaseSession>> = BTreeMap::new();
        for database in &self.databases {
            match SqlDialect::from_name(&database.kind) {
                Some(SqlDialect::Sqlite) => {
                    let path = database.path.as_ref().ok_or_else(|| {
                        MigrationError::config(format!(
                            "database '{}': sqlite needs a path",
                            database.name
                        ))
                    })?;
                    let path = base_dir.join(path);
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    sessions.insert(database.name.clone(), Box::new(SqliteSession::open(path)?));
                }
                _ => {
                    return Err(MigrationError::config(format!(
                        "database '{}': kind {:?} is not executable from this CLI",
                        database.name, database.kind
                    )));
                }
            }
        }
        Ok(sessions)
    }

    /// The declared models of a component: built-ins come from the engine,
    /// the rest from `models.toml` under the component root.
    pub fn component_models(
        &self,
        base_dir: &Path,
        name: &str,
    ) -> MigrateResult<Option<Vec<TableDef>>> {
        let entry = self
            .components
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| MigrationError::config(format!("unknown component '{name}'")))?;
        if entry.builtin {
            return Ok(Some(core_models()));
        }
        let path = base_dir.join(&entry.root).join(MODELS_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let file: ModelsFile = toml::from_str(&text)
            .map_err(|err| MigrationError::config(format!("{}: {err}", path.display())))?;
        let mut tables = file.tables;
        for table in &mut tables {
            table.normalize();
        }
        Ok(Some(tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[database]]
name = "test0"
kind = "sqlite"
path = "dbs/test0.sqlite3"
default_db = true

[[database]]
name = "test1"
kind = "sqlite"
path = "dbs/test1.sqlite3"

[[component]]
name = "sooners_core"
root = "components/sooners_core"
builtin = true

[[component]]
name = "sample1"
root = "components/sample1"

[milestones]
dir = "milestones"
"#;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_database(), Some("test0"));
        assert_eq!(config.databases.len(), 2);
        assert_eq!(config.components.len(), 2);
    }

    #[test]
    fn test_engine_config_order() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let engine = config.engine_config(Path::new("/tmp/project")).unwrap();
        let names: Vec<&str> = engine.components.keys().map(|name| name.as_str()).collect();
        assert_eq!(names, ["sooners_core", "sample1"]);
        assert_eq!(engine.default_database, "test0");
    }

    #[test]
    fn test_two_defaults_rejected() {
        let text = SAMPLE.replace(
            "name = \"test1\"\nkind = \"sqlite\"",
            "name = \"test1\"\nkind = \"sqlite\"\ndefault_db = true",
        );
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let text = SAMPLE.replace("kind = \"sqlite\"\npath = \"dbs/test0.sqlite3\"", "kind = \"oracle\"\npath = \"dbs/test0.sqlite3\"");
        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_component_models() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let models = config
            .component_models(dir.path(), "sooners_core")
            .unwrap()
            .unwrap();
        assert!(models.iter().any(|table| table.name == "sooners_configuration"));
    }

    #[test]
    fn test_models_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("components/sample1");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join(MODELS_FILE_NAME),
            r#"
[[table]]
name = "building"

[[table.column]]
name = "id"
type = "Integer"
primary_key = true

[[table.column]]
name = "label"
type = "String"
length = 32
nullable = false
"#,
        )
        .unwrap();
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let models = config
            .component_models(dir.path(), "sample1")
            .unwrap()
            .unwrap();
        assert_eq!(models.len(), 1);
        let table = &models[0];
        assert_eq!(table.name, "building");
        assert_eq!(table.columns.len(), 2);
        assert!(table.columns[0].primary_key);
        assert!(!table.columns[0].nullable);
        assert!(!table.columns[1].nullable);
    }

    #[test]
    fn test_missing_models_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert!(config.component_models(dir.path(), "sample1").unwrap().is_none());
    }
}
