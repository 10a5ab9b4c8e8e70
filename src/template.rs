//! Command placeholder rendering
//!
//! Local and remote command strings may reference a task's resolved ports
//! and params: `{in.port}`, `{out.port}`, `{param.key}`. Rendering happens
//! after resolution, right before the unit of work runs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::GantryError;
use crate::task::TaskIo;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(in|out|param)\.([A-Za-z0-9_\-]+)\}").expect("placeholder regex is valid")
});

/// Substitute `{in.x}` / `{out.x}` / `{param.x}` against resolved I/O
pub fn render(template: &str, io: &TaskIo) -> Result<String, GantryError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        rendered.push_str(&template[last..whole.start()]);

        let kind = &caps[1];
        let name = &caps[2];
        let value = match kind {
            "in" => io.input(name)?.location.to_string(),
            "out" => io.output(name)?.location.to_string(),
            _ => match io.param(name) {
                Some(Value::String(s)) => s.clone(),
                Some(v) => v.to_string(),
                None => {
                    return Err(GantryError::Template(format!(
                        "task '{}' has no param '{name}'",
                        io.task
                    )))
                }
            },
        };
        rendered.push_str(&value);
        last = whole.end();
    }

    rendered.push_str(&template[last..]);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetInfo;
    use crate::task::TaskRef;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn sample_io() -> TaskIo {
        let owner = TaskRef::new("b", "stamp");
        let mut inputs = HashMap::new();
        inputs.insert(
            Arc::from("in_data"),
            TargetInfo::new(TaskRef::new("a", "emit"), "/x/a.txt"),
        );
        let mut outputs = HashMap::new();
        outputs.insert(
            Arc::from("out_data"),
            TargetInfo::new(owner.clone(), "/x/a.txt.done"),
        );
        let mut params = HashMap::new();
        params.insert("threads".to_string(), json!(4));
        params.insert("mode".to_string(), json!("fast"));
        TaskIo {
            task: owner,
            inputs,
            outputs,
            params,
        }
    }

    #[test]
    fn renders_ports_and_params() {
        let io = sample_io();
        let cmd = render("stamp -j {param.threads} --mode {param.mode} {in.in_data} > {out.out_data}", &io)
            .unwrap();
        assert_eq!(cmd, "stamp -j 4 --mode fast /x/a.txt > /x/a.txt.done");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        let io = sample_io();
        assert_eq!(render("echo plain", &io).unwrap(), "echo plain");
    }

    #[test]
    fn unknown_port_placeholder_fails() {
        let io = sample_io();
        let err = render("cat {in.missing}", &io).unwrap_err();
        assert!(matches!(err, GantryError::UnknownPort { .. }));
    }

    #[test]
    fn unknown_param_placeholder_fails() {
        let io = sample_io();
        let err = render("run --opt {param.missing}", &io).unwrap_err();
        assert!(matches!(err, GantryError::Template(_)));
    }
}
