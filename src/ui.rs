use std::io::{self, IsTerminal};

use crate::metadata::WorktreeRecord;
use crate::outcome::Warning;

pub fn print_created(record: &WorktreeRecord) {
    let palette = Palette::auto();
    println!(
        "created {} for issue #{}",
        palette.name(&record.path),
        record.issue_number
    );
    for line in detail_lines(record, &palette) {
        println!("  {line}");
    }
}

pub fn print_deleted(record: &WorktreeRecord) {
    let palette = Palette::auto();
    println!(
        "deleted {} (issue #{}, port {} released)",
        palette.name(&record.path),
        record.issue_number,
        record.port
    );
}

pub fn print_worktree_list(records: &[WorktreeRecord], main_port: u16) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Worktrees"));
    println!(
        "{}",
        palette.dim(&format!("main: http://localhost:{main_port}"))
    );

    if records.is_empty() {
        println!("{}", palette.dim("no worktrees"));
        return;
    }

    for record in records {
        println!("{}", format_list_row(record, &palette));
    }
    println!("{}", palette.dim(&format!("{} worktree(s)", records.len())));
}

pub fn print_worktree_info(record: &WorktreeRecord) {
    let palette = Palette::auto();
    println!(
        "{} {}",
        palette.heading(&format!("#{}", record.issue_number)),
        palette.name(&record.path)
    );
    for line in detail_lines(record, &palette) {
        println!("  {line}");
    }
    println!("  created: {}", record.created_at);
}

pub fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn format_list_row(record: &WorktreeRecord, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {}",
        palette.id(&format!("#{}", record.issue_number)),
        palette.port(record.port),
        record.branch
    );
    if let Some(pid) = record.dev_server_pid {
        line.push(' ');
        line.push_str(&palette.dim(&format!("(pid {pid})")));
    }
    line
}

fn detail_lines(record: &WorktreeRecord, palette: &Palette) -> Vec<String> {
    let mut lines = vec![
        format!("branch: {}", record.branch),
        format!("path: {}", record.path),
        format!("port: {}", palette.port(record.port)),
        format!("url: {}", record.server_url()),
    ];
    if record.db_snapshots.is_empty() {
        lines.push(format!("databases: {}", palette.dim("none")));
    } else {
        lines.push(format!("databases: {}", record.db_snapshots.join(", ")));
    }
    if let Some(pid) = record.dev_server_pid {
        lines.push(format!("dev server pid: {pid}"));
    }
    lines
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn name(&self, text: &str) -> String {
        self.paint("1", text)
    }

    fn port(&self, port: u16) -> String {
        self.paint("33", &format!(":{port}"))
    }
}
