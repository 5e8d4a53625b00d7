//! 配置文件读写：缺省值合并用户值，缺字段时带注释重写。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;
    fn fields() -> &'static [FieldMeta];

    /// 反序列化之后的取值检查。
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 读取 `base_dir/FILE_NAME`（缺省为当前目录），不存在时写出带注释的默认配置。
pub fn load_or_create<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = base_dir
        .map(|dir| dir.join(T::FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(T::FILE_NAME));
    load_from_path(&path)
}

pub fn load_from_path<T: ConfigSpec>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        let config = T::default();
        write_with_comments(&config, path)?;
        info!(target: "startup", "已生成默认配置: {}", path.display());
        return Ok(config);
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let user: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let missing = missing_fields::<T>(&user);

    let mut merged = to_yaml_value(&T::default())?;
    // 空文件解析为 Null，保持默认值
    if !user.is_null() {
        merge_values(&mut merged, user);
    }
    let config: T = serde_yaml::from_value(merged).map_err(validation)?;
    config.validate().map_err(ConfigError::Validation)?;

    if !missing.is_empty() {
        debug!(target: "startup", ?missing, "配置缺少字段，补全后重写");
        write_with_comments(&config, path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let yaml = render_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = to_yaml_value(config)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut blocks = Vec::with_capacity(T::fields().len());
    for field in T::fields() {
        let key = Value::String(field.name.to_string());
        let value = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let mut single = Mapping::new();
        single.insert(key, value);
        let body = serde_yaml::to_string(&single).map_err(validation)?;

        let mut block = String::new();
        if !field.description.is_empty() {
            for line in field.description.lines() {
                block.push_str("# ");
                block.push_str(line);
                block.push('\n');
            }
        }
        block.push_str(body.trim_end());
        blocks.push(block);
    }

    Ok(blocks.join("\n") + "\n")
}

fn missing_fields<T: ConfigSpec>(user: &Value) -> Vec<&'static str> {
    let Value::Mapping(map) = user else {
        return T::fields().iter().map(|f| f.name).collect();
    };
    T::fields()
        .iter()
        .filter(|f| !map.contains_key(Value::String(f.name.to_string())))
        .map(|f| f.name)
        .collect()
}

/// 递归合并：映射逐键合并，其余类型由用户值整体覆盖。
fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        (dest, other) => *dest = other,
    }
}

fn to_yaml_value<T: Serialize>(config: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(config).map_err(validation)
}

fn validation(err: serde_yaml::Error) -> ConfigError {
    ConfigError::Validation(err.to_string())
}
