use crate::errors::DosingError;
use serde::{de::DeserializeOwned, Serialize, Serializer};
use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsStr,
    hash::Hash,
    path::Path,
};

/// Read a YAML file into `T` with the config crate. When `env_prefix` is
/// given, environment variables such as `{PREFIX}__PARAMETERS__TARGET_OD`
/// override values from the file. String scalars are coerced to the
/// declared numeric types; values that cannot be coerced fail the load.
///
/// * `filepath`: path to the YAML file.
/// * `env_prefix`: optional environment override prefix.
pub fn load_yaml<T, F>(filepath: F, env_prefix: Option<&str>) -> Result<T, DosingError>
where
    T: DeserializeOwned,
    F: AsRef<OsStr>,
{
    let file = Path::new(&filepath);
    if !file.is_file() {
        return Err(DosingError::ConfigFile {
            path: file.to_path_buf(),
            source: config::ConfigError::NotFound(file.to_string_lossy().into_owned()),
        });
    }

    let mut builder = config::Config::builder().add_source(config::File::new(
        &file.to_string_lossy(),
        config::FileFormat::Yaml,
    ));
    if let Some(prefix) = env_prefix {
        builder = builder.add_source(config::Environment::with_prefix(prefix).separator("__"));
    }

    builder
        .build()
        .and_then(|settings| settings.try_deserialize::<T>())
        .map_err(|source| DosingError::ConfigFile {
            path: file.to_path_buf(),
            source,
        })
}

/// Orders map keys when writing config files so that the same content
/// is always written in the same order.
///
/// * `value`: `HashMap`
/// * `serializer`: Serializer
pub fn ordered_map<S, K, T>(value: &HashMap<K, T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    K: Serialize + Ord + Hash,
    T: Serialize,
{
    let ordered: BTreeMap<_, _> = value.iter().collect();
    ordered.serialize(serializer)
}
