//! # ProcessSpec table.
//!
//! Expands the configured `[[process]]` groups into one [`ProcessSpec`] per
//! instance. The table is built once before the supervisor starts.
//!
//! ```text
//! group { class=storage, count=2, base_port=4500, first_id=0 }
//!   ├─► storage#0  port 4500  data_dir=<data>/4500
//!   └─► storage#1  port 4501  data_dir=<data>/4501
//! group { class=backup, count=1, first_id=1 }
//!   └─► backup#1              data_dir=<data>/backup-1
//! ```

use std::collections::BTreeMap;

use crate::config::{ConfigError, FleetConfig, validate_processes};
use crate::process::ProcessSpec;

/// Prefix of the environment variables carrying locality tags.
pub const LOCALITY_ENV_PREFIX: &str = "FLEET_LOCALITY_";

/// Builds the spec table.
///
/// The process groups are validated first, so ids and ports are in range.
pub fn build_table(cfg: &FleetConfig) -> Result<Vec<ProcessSpec>, ConfigError> {
    validate_processes(&cfg.processes)?;
    let mut specs = Vec::new();

    for group in &cfg.processes {
        for i in 0..group.count {
            let id = group.first_id + i;
            let port = group.base_port.map(|base| base + i as u16);
            let instance_dir = match port {
                Some(port) => port.to_string(),
                None => format!("{}-{id}", group.class),
            };
            let data_dir = cfg.layout.data_dir.join(instance_dir);

            let mut vars = BTreeMap::new();
            vars.insert("id", id.to_string());
            vars.insert("class", group.class.to_string());
            vars.insert("data_dir", data_dir.display().to_string());
            vars.insert("log_dir", cfg.layout.log_dir.display().to_string());
            vars.insert("cluster_file", cfg.layout.cluster_file.display().to_string());
            if let Some(port) = port {
                vars.insert("port", port.to_string());
            }

            let mut builder = ProcessSpec::builder(group.class, id, &group.command)
                .args(group.args.iter().map(|a| render(a, &vars)))
                .data_dir(&data_dir)
                .log_dir(&cfg.layout.log_dir);
            if let Some(port) = port {
                builder = builder.port(port);
            }
            if let Some(dir) = &group.working_dir {
                builder = builder.working_dir(dir);
            }
            for (key, value) in &cfg.locality {
                builder = builder.env(
                    format!("{LOCALITY_ENV_PREFIX}{}", key.to_ascii_uppercase()),
                    value,
                );
            }
            for (key, value) in &group.env {
                builder = builder.env(key, render(value, &vars));
            }
            specs.push(builder.build());
        }
    }
    Ok(specs)
}

/// Substitutes `{name}` placeholders; unknown placeholders are kept verbatim.
pub(crate) fn render(template: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                let key = &tail[1..end];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessClass;
    use std::path::Path;

    fn config() -> FleetConfig {
        FleetConfig::from_toml(
            r#"
            [layout]
            data_dir = "/d"
            log_dir = "/l"
            cluster_file = "/c/fdb.cluster"

            [locality]
            zone_id = "z1"

            [[process]]
            class = "storage"
            command = "/bin/fdbserver"
            args = ["--datadir={data_dir}", "--public_address=127.0.0.1:{port}", "--class={class}"]
            count = 2
            base_port = 4500

            [[process]]
            class = "backup"
            command = "/bin/backup_agent"
            args = ["-C", "{cluster_file}", "--id={id}", "{unknown}"]
            first_id = 1
            env = { AGENT_LOG = "{log_dir}/agent" }
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_expands_groups() {
        let specs = build_table(&config()).unwrap();
        let names: Vec<String> = specs.iter().map(ProcessSpec::name).collect();
        assert_eq!(names, ["storage#0", "storage#1", "backup#1"]);

        let s1 = &specs[1];
        assert_eq!(s1.port(), Some(4501));
        assert_eq!(s1.data_dir(), Some(Path::new("/d/4501")));
        assert_eq!(
            s1.args(),
            [
                "--datadir=/d/4501",
                "--public_address=127.0.0.1:4501",
                "--class=storage"
            ]
        );
        assert_eq!(
            s1.env().get("FLEET_LOCALITY_ZONE_ID").map(String::as_str),
            Some("z1")
        );
    }

    #[test]
    fn test_portless_backup() {
        let specs = build_table(&config()).unwrap();
        let backup = &specs[2];
        assert_eq!(backup.class(), ProcessClass::Backup);
        assert_eq!(backup.port(), None);
        assert_eq!(backup.data_dir(), Some(Path::new("/d/backup-1")));
        assert_eq!(backup.args(), ["-C", "/c/fdb.cluster", "--id=1", "{unknown}"]);
        assert_eq!(
            backup.env().get("AGENT_LOG").map(String::as_str),
            Some("/l/agent")
        );
    }

    #[test]
    fn test_render_unterminated_brace() {
        let vars = BTreeMap::new();
        assert_eq!(render("a{b", &vars), "a{b");
    }

    #[test]
    fn test_out_of_range_group_is_rejected() {
        let mut cfg = config();
        cfg.processes[0].base_port = Some(65535);
        let err = build_table(&cfg).unwrap_err();
        assert_eq!(err.as_label(), "config_validation");

        let mut cfg = config();
        cfg.processes[1].first_id = u32::MAX;
        cfg.processes[1].count = 2;
        assert!(build_table(&cfg).is_err());
    }

}
