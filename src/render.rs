// src/render.rs
// Turns API payloads into the markdown text returned by tools/call

use std::fmt::Write;

use crate::guest_exec::ExecOutcome;
use crate::inventory::{
    ClusterOverview, GuestFilter, GuestStatus, GuestSummary, MemoryUsage, NodeStatus, NodeSummary, StorageSummary,
};
use crate::policy::Access;
use crate::tools::GuestRef;

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, BYTE_UNITS[unit])
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

pub fn format_percent(used: u64, total: u64) -> String {
    if total == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", used as f64 / total as f64 * 100.0)
}

// cpu is reported as a 0..1 fraction of the allotted cores
fn format_cpu(fraction: Option<f64>) -> String {
    format!("{:.1}%", fraction.unwrap_or(0.0) * 100.0)
}

fn usage(used: Option<u64>, total: Option<u64>) -> String {
    let (used, total) = (used.unwrap_or(0), total.unwrap_or(0));
    format!("{} / {} ({})", format_bytes(used), format_bytes(total), format_percent(used, total))
}

fn status_icon(status: &str) -> &'static str {
    match status {
        "online" | "running" => "🟢",
        "offline" | "stopped" => "🔴",
        _ => "🟡",
    }
}

fn or_unknown(status: &str) -> &str {
    if status.is_empty() {
        "unknown"
    } else {
        status
    }
}

pub fn render_nodes(nodes: &[NodeSummary]) -> String {
    if nodes.is_empty() {
        return "No nodes found in the cluster.".to_string();
    }
    let mut out = String::from("🖥️ **Proxmox Nodes**\n");
    for node in nodes {
        let _ = write!(out, "\n{} **{}**\n   • Status: {}\n", status_icon(&node.status), node.node, or_unknown(&node.status));
        if !node.is_online() {
            continue;
        }
        let _ = writeln!(out, "   • Uptime: {}", format_uptime(node.uptime.unwrap_or(0)));
        let _ = writeln!(out, "   • CPU: {} of {} cores", format_cpu(node.cpu), node.maxcpu.unwrap_or(0));
        let _ = writeln!(out, "   • Memory: {}", usage(node.mem, node.maxmem));
    }
    out
}

fn memory_line(out: &mut String, label: &str, memory: Option<&MemoryUsage>) {
    if let Some(memory) = memory {
        let _ = writeln!(out, "   • {}: {}", label, usage(Some(memory.used), Some(memory.total)));
    }
}

pub fn render_node_status(node: &str, status: &NodeStatus) -> String {
    let mut out = format!("🖥️ **Node {}**\n\n", node);
    if let Some(cpu) = &status.cpuinfo {
        let _ = writeln!(
            out,
            "   • CPU model: {} ({} sockets, {} cores, {} threads)",
            cpu.model.as_deref().unwrap_or("unknown"),
            cpu.sockets.unwrap_or(0),
            cpu.cores.unwrap_or(0),
            cpu.cpus.unwrap_or(0)
        );
    }
    let _ = writeln!(out, "   • CPU usage: {}", format_cpu(status.cpu));
    if !status.loadavg.is_empty() {
        let _ = writeln!(out, "   • Load average: {}", status.loadavg.join(", "));
    }
    memory_line(&mut out, "Memory", status.memory.as_ref());
    memory_line(&mut out, "Swap", status.swap.as_ref());
    memory_line(&mut out, "Root filesystem", status.rootfs.as_ref());
    let _ = writeln!(out, "   • Uptime: {}", format_uptime(status.uptime.unwrap_or(0)));
    if let Some(version) = &status.pveversion {
        let _ = writeln!(out, "   • PVE version: {}", version);
    }
    if let Some(kernel) = &status.kversion {
        let _ = writeln!(out, "   • Kernel: {}", kernel);
    }
    out
}

fn listing_noun(filter: GuestFilter) -> &'static str {
    match filter {
        GuestFilter::Qemu => "virtual machines",
        GuestFilter::Lxc => "containers",
        GuestFilter::All => "virtual machines or containers",
    }
}

pub fn render_guests(guests: &[GuestSummary], node: Option<&str>, filter: GuestFilter) -> String {
    let scope = node.map(|n| format!(" on node {}", n)).unwrap_or_default();
    if guests.is_empty() {
        return format!("No {} found{}.", listing_noun(filter), scope);
    }
    let title = match filter {
        GuestFilter::Qemu => "Virtual Machines",
        GuestFilter::Lxc => "Containers",
        GuestFilter::All => "Virtual Machines and Containers",
    };
    let mut out = format!("🗃️ **{}{}**\n", title, scope);
    for guest in guests {
        let _ = write!(
            out,
            "\n{} **{}** ({} {})\n   • Node: {}\n   • Status: {}\n",
            status_icon(&guest.status),
            guest.name.as_deref().unwrap_or("unnamed"),
            guest.kind.label(),
            guest.vmid,
            guest.node,
            or_unknown(&guest.status)
        );
        if let Some(cpus) = guest.cpus {
            let _ = writeln!(out, "   • CPU: {} cores", cpus);
        }
        if guest.maxmem.is_some() {
            let _ = writeln!(out, "   • Memory: {}", usage(guest.mem, guest.maxmem));
        }
        if guest.status == "running" {
            let _ = writeln!(out, "   • Uptime: {}", format_uptime(guest.uptime.unwrap_or(0)));
        }
    }
    out
}

pub fn render_guest_status(guest: &GuestRef, status: &GuestStatus) -> String {
    let mut out = format!(
        "{} **{}** ({} {} on {})\n\n   • Status: {}\n",
        status_icon(&status.status),
        status.name.as_deref().unwrap_or("unnamed"),
        guest.kind.label(),
        guest.vmid,
        guest.node,
        or_unknown(&status.status)
    );
    if let Some(qmp) = &status.qmpstatus {
        let _ = writeln!(out, "   • QEMU state: {}", qmp);
    }
    let _ = writeln!(out, "   • CPU: {} of {} cores", format_cpu(status.cpu), status.cpus.unwrap_or(0.0));
    let _ = writeln!(out, "   • Memory: {}", usage(status.mem, status.maxmem));
    if status.maxdisk.is_some() {
        let _ = writeln!(out, "   • Disk: {}", usage(status.disk, status.maxdisk));
    }
    if status.netin.is_some() || status.netout.is_some() {
        let _ = writeln!(
            out,
            "   • Network: {} in / {} out",
            format_bytes(status.netin.unwrap_or(0)),
            format_bytes(status.netout.unwrap_or(0))
        );
    }
    if status.is_running() {
        let _ = writeln!(out, "   • Uptime: {}", format_uptime(status.uptime.unwrap_or(0)));
    }
    if let Some(agent) = status.agent {
        let _ = writeln!(out, "   • Guest agent: {}", if agent != 0 { "enabled" } else { "disabled" });
    }
    out
}

pub fn render_storage(storages: &[StorageSummary], node: Option<&str>) -> String {
    let scope = node.map(|n| format!(" on node {}", n)).unwrap_or_default();
    if storages.is_empty() {
        return format!("No storage found{}.", scope);
    }
    let mut out = format!("💾 **Storage{}**\n", scope);
    for storage in storages {
        let active = storage.active.map_or(true, |a| a != 0);
        let placement = if storage.is_shared() { "shared".to_string() } else { format!("node {}", storage.node) };
        let _ = write!(
            out,
            "\n{} **{}** ({}, {})\n   • Content: {}\n",
            if active { "🟢" } else { "🔴" },
            storage.storage,
            or_unknown(&storage.storage_type),
            placement,
            if storage.content.is_empty() { "-" } else { storage.content.as_str() }
        );
        if storage.total.is_some() {
            let _ = writeln!(out, "   • Usage: {}", usage(storage.used, storage.total));
            let _ = writeln!(out, "   • Available: {}", format_bytes(storage.avail.unwrap_or(0)));
        }
    }
    out
}

pub fn render_cluster(overview: &ClusterOverview, access: Access) -> String {
    let online: Vec<&NodeSummary> = overview.nodes.iter().filter(|n| n.is_online()).collect();
    let cpu_total: u64 = online.iter().map(|n| u64::from(n.maxcpu.unwrap_or(0))).sum();
    let cpu_used: f64 = online.iter().map(|n| n.cpu.unwrap_or(0.0) * f64::from(n.maxcpu.unwrap_or(0))).sum();
    let mem_used: u64 = online.iter().map(|n| n.mem.unwrap_or(0)).sum();
    let mem_total: u64 = online.iter().map(|n| n.maxmem.unwrap_or(0)).sum();

    let mut out = String::from("🏢 **Cluster Status**\n\n");
    if let Some(cluster) = &overview.cluster {
        let quorate = cluster.quorate.map_or("unknown", |q| if q != 0 { "yes" } else { "no" });
        let _ = writeln!(out, "   • Cluster: {}", if cluster.name.is_empty() { "unnamed" } else { cluster.name.as_str() });
        let _ = writeln!(out, "   • Quorate: {}", quorate);
    }
    let _ = writeln!(out, "   • Nodes online: {} / {}", online.len(), overview.nodes.len());
    let _ = writeln!(out, "   • CPU: {:.1} of {} cores in use", cpu_used, cpu_total);
    let _ = writeln!(out, "   • Memory: {}", usage(Some(mem_used), Some(mem_total)));

    if let Some(resources) = &overview.resources {
        let count = |kind: &str| resources.iter().filter(|r| r.resource_type == kind).count();
        let running = |kind: &str| {
            resources
                .iter()
                .filter(|r| r.resource_type == kind && r.status.as_deref() == Some("running"))
                .count()
        };
        let (disk_used, disk_total) = resources
            .iter()
            .filter(|r| r.resource_type == "storage")
            .fold((0u64, 0u64), |(used, total), r| (used + r.disk.unwrap_or(0), total + r.maxdisk.unwrap_or(0)));
        let _ = writeln!(out, "   • VMs: {} ({} running)", count("qemu"), running("qemu"));
        let _ = writeln!(out, "   • Containers: {} ({} running)", count("lxc"), running("lxc"));
        let _ = writeln!(out, "   • Storage: {}", usage(Some(disk_used), Some(disk_total)));
    }

    if access == Access::Basic {
        out.push_str(
            "\nℹ️ Basic view. Enable elevated permissions for cluster name, quorum and guest/storage totals.\n",
        );
    } else if !overview.unavailable.is_empty() {
        let _ = writeln!(
            out,
            "\nℹ️ Partial view. Could not read {}; check the API token's privileges.",
            overview.unavailable.join(", ")
        );
    }
    out
}

pub fn render_exec(guest: &GuestRef, command: &str, outcome: &ExecOutcome) -> String {
    match outcome {
        ExecOutcome::Submitted { pid } => {
            let pid = pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
            format!(
                "✅ Command submitted to the guest agent of VM {} on {}\n\n   • Command: `{}`\n   • PID: {}\n\n\
                 The command runs asynchronously; its output is not collected.\n",
                guest.vmid, guest.node, command, pid
            )
        }
        ExecOutcome::Completed { output } => {
            let shown = if output.trim().is_empty() { "(no output)" } else { output.trim_end() };
            format!(
                "✅ Command executed in container {} on {}\n\n   • Command: `{}`\n\n```\n{}\n```\n",
                guest.vmid, guest.node, command, shown
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{ClusterResource, ClusterStatusEntry, GuestKind};

    fn online(name: &str, cpu: f64, maxcpu: u32, mem: u64, maxmem: u64) -> NodeSummary {
        NodeSummary {
            node: name.to_string(),
            status: "online".to_string(),
            cpu: Some(cpu),
            maxcpu: Some(maxcpu),
            mem: Some(mem),
            maxmem: Some(maxmem),
            ..Default::default()
        }
    }

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(17_179_869_184), "16.00 GB");
    }

    #[test]
    fn uptime_drops_leading_zero_units() {
        assert_eq!(format_uptime(0), "0m");
        assert_eq!(format_uptime(3_660), "1h 1m");
        assert_eq!(format_uptime(93_784), "1d 2h 3m");
    }

    #[test]
    fn percent_of_zero_total_is_not_a_number() {
        assert_eq!(format_percent(1, 4), "25.0%");
        assert_eq!(format_percent(5, 0), "n/a");
    }

    #[test]
    fn offline_nodes_show_only_their_status() {
        let nodes = vec![
            online("pve1", 0.5, 4, 1024, 4096),
            NodeSummary { node: "pve2".to_string(), status: "offline".to_string(), ..Default::default() },
        ];
        let text = render_nodes(&nodes);
        assert!(text.contains("🟢 **pve1**"));
        assert!(text.contains("CPU: 50.0% of 4 cores"));
        assert!(text.contains("🔴 **pve2**\n   • Status: offline\n"));
        assert_eq!(text.matches("Uptime").count(), 1);
    }

    #[test]
    fn empty_guest_listing_names_the_scope() {
        assert_eq!(render_guests(&[], Some("pve1"), GuestFilter::Lxc), "No containers found on node pve1.");
        assert_eq!(render_guests(&[], None, GuestFilter::All), "No virtual machines or containers found.");
    }

    #[test]
    fn guests_render_with_kind_and_node() {
        let guest = GuestSummary {
            vmid: 101,
            name: Some("dns".to_string()),
            status: "running".to_string(),
            node: "pve1".to_string(),
            kind: GuestKind::Lxc,
            ..Default::default()
        };
        let text = render_guests(&[guest], None, GuestFilter::Lxc);
        assert!(text.contains("**dns** (container 101)"));
        assert!(text.contains("Node: pve1"));
    }

    #[test]
    fn basic_cluster_view_points_at_elevation() {
        let overview = ClusterOverview {
            nodes: vec![online("pve1", 0.25, 8, 4096, 8192), NodeSummary { node: "pve2".to_string(), ..Default::default() }],
            ..Default::default()
        };
        let text = render_cluster(&overview, Access::Basic);
        assert!(text.contains("Nodes online: 1 / 2"));
        assert!(text.contains("2.0 of 8 cores"));
        assert!(text.contains("Enable elevated permissions"));
        assert!(!text.contains("Quorate"));
    }

    #[test]
    fn full_cluster_view_counts_guests_and_quorum() {
        let resource = |kind: &str, status: &str| ClusterResource {
            resource_type: kind.to_string(),
            status: Some(status.to_string()),
            ..Default::default()
        };
        let overview = ClusterOverview {
            nodes: vec![online("pve1", 0.1, 4, 1, 2)],
            cluster: Some(ClusterStatusEntry {
                entry_type: "cluster".to_string(),
                name: "lab".to_string(),
                quorate: Some(1),
                ..Default::default()
            }),
            resources: Some(vec![resource("qemu", "running"), resource("qemu", "stopped"), resource("lxc", "running")]),
            unavailable: Vec::new(),
        };
        let text = render_cluster(&overview, Access::Full);
        assert!(text.contains("Cluster: lab"));
        assert!(text.contains("Quorate: yes"));
        assert!(text.contains("VMs: 2 (1 running)"));
        assert!(text.contains("Containers: 1 (1 running)"));
        assert!(!text.contains("Basic view"));
    }

    #[test]
    fn exec_reports_echo_the_command() {
        let guest = GuestRef { node: "pve1".to_string(), vmid: 100, kind: GuestKind::Qemu };
        let submitted = render_exec(&guest, "uptime", &ExecOutcome::Submitted { pid: Some(7) });
        assert!(submitted.contains("`uptime`"));
        assert!(submitted.contains("PID: 7"));

        let completed = render_exec(&guest, "true", &ExecOutcome::Completed { output: String::new() });
        assert!(completed.contains("(no output)"));
    }
}
