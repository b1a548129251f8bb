//! 配置校验模块
//!
//! 校验规则：
//! - 字段级规则 (validator derive)：writeKey 非空、flushQueueSize 1..=250、
//!   retry.max_attempts >= 1、destination 名称非空、queue_capacity >= 1
//! - writeKey 不能全为空白
//! - destination 名称唯一
//! - retry 退避区间合法 (initial <= max)
//! - transport 必填参数齐全 (file: path, network: addr)
//! - tracking plan 中引用的 destination 必须存在

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{AnalyticsConfig, PipelineError, TransportType, ALL_INTEGRATIONS_KEY};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 AnalyticsConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    validate_fields(config)?;
    validate_write_key(config)?;
    validate_destination_names(config)?;
    validate_retry(config)?;
    validate_transport_params(config)?;
    validate_tracking_plan(config)?;
    Ok(())
}

/// 字段级规则
fn validate_fields(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_error(&errors, String::new());
            Err(PipelineError::config_validation(field, message))
        }
    }
}

/// 取第一条错误，字段路径形如 `destinations[1].name`
fn first_error(errors: &ValidationErrors, prefix: String) -> (String, String) {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (name, kind) in fields {
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                if let Some(err) = errs.first() {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    return (path, message);
                }
            }
            ValidationErrorsKind::Struct(nested) => return first_error(nested, path),
            ValidationErrorsKind::List(items) => {
                if let Some((idx, nested)) = items.iter().next() {
                    return first_error(nested, format!("{path}[{idx}]"));
                }
            }
        }
    }
    (prefix, "invalid value".to_string())
}

/// 校验 writeKey
fn validate_write_key(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    if config.write_key.trim().is_empty() {
        return Err(PipelineError::config_validation(
            "write_key",
            "writeKey must not be null or empty.",
        ));
    }
    Ok(())
}

/// 校验 destination 名称唯一性
fn validate_destination_names(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for (idx, destination) in config.destinations.iter().enumerate() {
        if destination.name == ALL_INTEGRATIONS_KEY {
            return Err(PipelineError::config_validation(
                format!("destinations[{idx}].name"),
                format!("'{ALL_INTEGRATIONS_KEY}' is reserved"),
            ));
        }
        if !seen.insert(destination.name.as_str()) {
            return Err(PipelineError::config_validation(
                format!("destinations[name={}]", destination.name),
                "duplicate destination name",
            ));
        }
    }
    Ok(())
}

/// 校验重试配置
fn validate_retry(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    let retry = &config.retry;
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(PipelineError::config_validation(
            "retry.initial_backoff_ms / retry.max_backoff_ms",
            format!(
                "initial_backoff_ms ({}) must be <= max_backoff_ms ({})",
                retry.initial_backoff_ms, retry.max_backoff_ms
            ),
        ));
    }
    Ok(())
}

/// 校验 transport 参数
fn validate_transport_params(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    for destination in &config.destinations {
        let field = |param: &str| format!("destinations[{}].params.{}", destination.name, param);

        match destination.transport {
            TransportType::Log => {}
            TransportType::File => {
                let path = destination.params.get("path").map(|p| p.trim());
                if path.is_none_or(str::is_empty) {
                    return Err(PipelineError::config_validation(
                        field("path"),
                        "file transport requires 'path'",
                    ));
                }
            }
            TransportType::Network => {
                let Some(addr) = destination.params.get("addr") else {
                    return Err(PipelineError::config_validation(
                        field("addr"),
                        "network transport requires 'addr'",
                    ));
                };
                if let Err(e) = addr.parse::<SocketAddr>() {
                    return Err(PipelineError::config_validation(
                        field("addr"),
                        format!("invalid address '{addr}': {e}"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// 校验 tracking plan 引用
fn validate_tracking_plan(config: &AnalyticsConfig) -> Result<(), PipelineError> {
    let known: HashSet<_> = config.destinations.iter().map(|d| d.name.as_str()).collect();

    let mut events: Vec<_> = config.tracking_plan.track.iter().collect();
    events.sort_by(|a, b| a.0.cmp(b.0));

    for (event, plan) in events {
        if event.trim().is_empty() {
            return Err(PipelineError::config_validation(
                "tracking_plan.track",
                "event name cannot be empty",
            ));
        }
        for destination in plan.integrations.keys() {
            if destination != ALL_INTEGRATIONS_KEY && !known.contains(destination.as_str()) {
                return Err(PipelineError::config_validation(
                    format!("tracking_plan.track.{event}.integrations.{destination}"),
                    format!("destination '{destination}' not found in destinations"),
                ));
            }
        }
    }
    Ok(())
}
