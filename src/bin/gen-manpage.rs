//! Man page generator for boardio
//!
//! Writes `boardio.1` plus one page per subcommand (`boardio-gpio.1`,
//! `boardio-gpio-get.1`, ...).
//!
//! Usage: cargo run --bin gen-manpage -- [--output-dir DIR]

use clap::{Command, CommandFactory, Parser};
use std::fs;
use std::path::PathBuf;

#[path = "../cli.rs"]
mod cli;

#[derive(Parser)]
#[command(name = "gen-manpage", about = "Render the boardio man pages")]
struct Args {
    /// Directory the pages are written to
    #[arg(short, long, default_value = "man")]
    output_dir: PathBuf,
}

/// Every page to render, named the way `man` looks them up
fn pages(cmd: &Command, prefix: &str, out: &mut Vec<(String, Command)>) {
    let name = if prefix.is_empty() {
        cmd.get_name().to_string()
    } else {
        format!("{}-{}", prefix, cmd.get_name())
    };
    out.push((name.clone(), cmd.clone().name(name.clone())));
    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" || sub.is_hide_set() {
            continue;
        }
        pages(sub, &name, out);
    }
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let mut cmd = cli::Cli::command();
    cmd.build();
    let mut all = Vec::new();
    pages(&cmd, "", &mut all);

    for (name, page) in all {
        let mut buffer = Vec::new();
        clap_mangen::Man::new(page).render(&mut buffer)?;
        let path = args.output_dir.join(format!("{}.1", name));
        fs::write(&path, buffer)?;
        println!("  {}", path.display());
    }

    println!("\nTo view: man -l {}", args.output_dir.join("boardio.1").display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_page_per_subcommand() {
        let mut cmd = cli::Cli::command();
        cmd.build();
        let mut all = Vec::new();
        pages(&cmd, "", &mut all);
        let names: Vec<&str> = all.iter().map(|(name, _)| name.as_str()).collect();

        assert_eq!(names[0], "boardio");
        assert!(names.contains(&"boardio-gpio"));
        assert!(names.contains(&"boardio-gpio-get"));
        assert!(names.contains(&"boardio-i2c-detect"));
        assert!(!names.iter().any(|name| name.ends_with("-help")));
    }

    #[test]
    fn output_dir_defaults_to_man() {
        let args = Args::parse_from(["gen-manpage"]);
        assert_eq!(args.output_dir, PathBuf::from("man"));
        let args = Args::parse_from(["gen-manpage", "-o", "out"]);
        assert_eq!(args.output_dir, PathBuf::from("out"));
    }
}
