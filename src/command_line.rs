// ContainerConfig -> `docker run|create` argument list. Pure and deterministic:
// one argv element per value, no shell involved.

use crate::error::DockerError;
use crate::models::{CommandSpec, ContainerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Create,
    /// `run`, always detached.
    Run,
}

impl RunMode {
    pub fn verb(self) -> &'static str {
        match self {
            RunMode::Create => "create",
            RunMode::Run => "run",
        }
    }
}

fn flag(args: &mut Vec<String>, name: &str, value: impl Into<String>) {
    args.push(name.to_string());
    args.push(value.into());
}

fn opt_flag(args: &mut Vec<String>, name: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        flag(args, name, v);
    }
}

fn repeated(args: &mut Vec<String>, name: &str, values: &[String]) {
    for v in values.iter().filter(|v| !v.is_empty()) {
        flag(args, name, v.as_str());
    }
}

/// Arguments following the verb. Fails only when `image` is empty or would be
/// read as a flag.
pub fn build_args(config: &ContainerConfig, mode: RunMode) -> Result<Vec<String>, DockerError> {
    let image = config.image.trim();
    crate::docker_repo::validate_operand("image", image)?;

    let mut args = Vec::new();

    if mode == RunMode::Run {
        args.push("-d".to_string());
    }
    if config.tty {
        args.push("-t".to_string());
    }
    if config.interactive {
        args.push("-i".to_string());
    }
    if config.remove {
        args.push("--rm".to_string());
    }

    opt_flag(&mut args, "--name", Some(config.name.as_str()));
    opt_flag(&mut args, "--hostname", config.hostname.as_deref());
    opt_flag(&mut args, "--domainname", config.domainname.as_deref());

    for (k, v) in config.environment.iter() {
        flag(&mut args, "-e", format!("{}={}", k, v));
    }
    repeated(&mut args, "--env-file", &config.env_files);
    for (k, v) in config.labels.iter() {
        flag(&mut args, "--label", format!("{}={}", k, v));
    }

    if config.publish_all_ports {
        args.push("-P".to_string());
    } else {
        for port in &config.ports {
            flag(&mut args, "-p", port.to_string());
        }
    }

    repeated(&mut args, "-v", &config.volumes);
    for mount in &config.mounts {
        flag(&mut args, "--mount", mount.to_arg());
    }

    if let Some(restart) = &config.restart {
        flag(&mut args, "--restart", restart.to_string());
    }

    opt_flag(&mut args, "--user", config.user.as_deref());
    opt_flag(&mut args, "--workdir", config.workdir.as_deref());

    // A list entrypoint is split: first element is the binary, the rest are
    // prepended to the command.
    let mut entrypoint_args: Vec<String> = Vec::new();
    match &config.entrypoint {
        Some(CommandSpec::Line(line)) if !line.is_empty() => flag(&mut args, "--entrypoint", line.as_str()),
        Some(CommandSpec::Args(list)) => {
            if let Some((first, rest)) = list.split_first() {
                flag(&mut args, "--entrypoint", first.as_str());
                entrypoint_args.extend(rest.iter().cloned());
            }
        }
        _ => {}
    }

    if let Some(logging) = config.logging.as_ref().filter(|l| !l.driver.is_empty()) {
        flag(&mut args, "--log-driver", logging.driver.as_str());
        for (k, v) in logging.options.iter() {
            flag(&mut args, "--log-opt", format!("{}={}", k, v));
        }
    }

    let security = &config.security;
    if security.privileged {
        args.push("--privileged".to_string());
    }
    repeated(&mut args, "--cap-add", &security.cap_add);
    repeated(&mut args, "--cap-drop", &security.cap_drop);
    for opt in security.security_opts() {
        flag(&mut args, "--security-opt", opt);
    }
    repeated(&mut args, "--device-cgroup-rule", &security.device_cgroup_rules);
    repeated(&mut args, "--group-add", &security.group_add);
    opt_flag(&mut args, "--userns", security.userns_mode.as_deref());
    opt_flag(&mut args, "--pid", security.pid_mode.as_deref());
    opt_flag(&mut args, "--ipc", security.ipc_mode.as_deref());
    opt_flag(&mut args, "--uts", security.uts_mode.as_deref());
    opt_flag(&mut args, "--cgroupns", security.cgroupns_mode.as_deref());

    opt_flag(&mut args, "--network", config.network_mode.as_deref());
    repeated(&mut args, "--add-host", &config.extra_hosts);
    repeated(&mut args, "--dns", &config.dns);

    for (k, v) in config.sysctls.iter() {
        flag(&mut args, "--sysctl", format!("{}={}", k, v));
    }

    opt_flag(&mut args, "--stop-signal", config.stop_signal.as_deref());
    if let Some(t) = config.stop_timeout {
        flag(&mut args, "--stop-timeout", t.to_string());
    }

    let resources = &config.resources;
    if let Some(cpus) = resources.cpus {
        flag(&mut args, "--cpus", cpus.to_string());
    }
    if let Some(shares) = resources.cpu_shares {
        flag(&mut args, "--cpu-shares", shares.to_string());
    }
    opt_flag(&mut args, "--cpuset-cpus", resources.cpuset_cpus.as_deref());
    opt_flag(&mut args, "--memory", resources.memory.as_deref());
    opt_flag(&mut args, "--memory-reservation", resources.memory_reservation.as_deref());
    opt_flag(&mut args, "--memory-swap", resources.memory_swap.as_deref());
    if let Some(pids) = resources.pids_limit {
        flag(&mut args, "--pids-limit", pids.to_string());
    }

    args.push(image.to_string());

    args.extend(entrypoint_args);
    match &config.command {
        Some(CommandSpec::Line(line)) if !line.is_empty() => args.push(line.clone()),
        Some(CommandSpec::Args(list)) => args.extend(list.iter().cloned()),
        _ => {}
    }

    Ok(args)
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// POSIX-shell rendering of a full command, for logs and display only.
pub fn to_shell_line(program: &str, args: &[String]) -> String {
    std::iter::once(shell_quote(program))
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_line_quotes_only_when_needed() {
        let args = vec!["-e".to_string(), "MSG=it's here".to_string(), "nginx:1.25".to_string()];
        assert_eq!(
            to_shell_line("docker", &args),
            r"docker -e 'MSG=it'\''s here' nginx:1.25"
        );
    }

    #[test]
    fn run_mode_verbs() {
        assert_eq!(RunMode::Run.verb(), "run");
        assert_eq!(RunMode::Create.verb(), "create");
    }
}
