//! mailarc CLI - personal IMAP mailbox archiver.

use std::env;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::fmt::WriteStyle;
use mailarc_core::{
    AppConfig, AppPaths, Archiver, DecodeReport, Digest, FolderReport, FolderStats, ImapSession,
    MessageStore, RemoteMailbox, RunOptions, RunReport, decode_folder, digest_inputs,
    export_folder, render,
};
use log::{LevelFilter, debug, info};
use serde::Serialize;

const APP_NAME: &str = env!("CARGO_PKG_NAME");

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config loaded from {}", ctx.paths.global_config.display());

    match cli.command {
        Command::Download(args) => handle_download(&ctx, args),
        Command::Export(args) => handle_export(&ctx, args),
        Command::Decode(args) => handle_decode(&ctx, args),
        Command::Digest(args) => handle_digest(&ctx, args),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Archive an IMAP mailbox into local files, mbox containers and HTML digests.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, global = true)]
    debug: bool,
    #[arg(long, global = true)]
    trace: bool,
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    #[arg(long, global = true)]
    yaml: bool,
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download every folder of an account, then optionally export and decode
    #[command(alias = "dl")]
    Download(DownloadArgs),
    /// Append stored messages of a folder tree to mbox files
    Export(ExportArgs),
    /// Decode stored messages of one folder and build its digest
    Decode(DecodeArgs),
    /// Build a digest from already decoded HTML files
    Digest(DigestArgs),
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Init(InitCommand),
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
struct DownloadArgs {
    /// Account login; also names the local archive directory
    username: String,
    /// Account password (or app password)
    #[arg(env = "MAILARC_PASSWORD", hide_env_values = true)]
    password: String,
    /// Export each folder into an mbox file after downloading
    #[arg(short = 'm', long)]
    mbox: bool,
    /// Delete local messages that no longer exist on the server
    #[arg(short = 's', long = "sync")]
    prune: bool,
    /// Only messages received within this many days
    #[arg(short = 'a', long = "max-age", value_name = "DAYS")]
    max_age: Option<u32>,
    /// Only unseen messages
    #[arg(short = 'u', long)]
    unseen: bool,
    /// Only these folders (canonical names, e.g. Archive/2024)
    #[arg(short = 'i', long, value_name = "NAME", num_args = 1..)]
    include: Vec<String>,
    /// Never these folders
    #[arg(short = 'e', long, value_name = "NAME", num_args = 1..)]
    exclude: Vec<String>,
    /// Decode messages and build digests after downloading
    #[arg(long)]
    decode: bool,
    #[command(flatten)]
    decode_flags: DecodeFlags,
    /// Archive root directory
    #[arg(long, value_name = "DIR")]
    root: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct DecodeFlags {
    /// Skip writing .txt files
    #[arg(long = "no-text")]
    no_text: bool,
    /// Skip writing .html files and digests
    #[arg(long = "no-html")]
    no_html: bool,
    /// Save attachments next to the decoded bodies
    #[arg(long)]
    attachments: bool,
    /// Letters per digest batch page
    #[arg(short = 'b', long = "batch-size", value_name = "N")]
    batch_size: Option<usize>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Folder directory (or account directory) to export
    dir: PathBuf,
}

#[derive(Debug, Args)]
struct DecodeArgs {
    /// Folder directory holding raw messages
    dir: PathBuf,
    /// Output directory (default: mirrored under the decode output dir)
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
    #[command(flatten)]
    decode_flags: DecodeFlags,
}

#[derive(Debug, Args)]
struct DigestArgs {
    /// Directory of decoded HTML files
    dir: PathBuf,
    /// Letters per digest batch page
    #[arg(short = 'b', long = "batch-size", value_name = "N")]
    batch_size: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Path,
    Reset,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    #[arg(long = "force")]
    force: bool,
}

impl DownloadArgs {
    /// Fold command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.imap.host = host.clone();
        }
        if let Some(port) = self.port {
            config.imap.port = port;
        }
        if let Some(root) = &self.root {
            config.archive.root = Some(root.clone());
        }
        config.archive.mbox |= self.mbox;
        config.archive.prune |= self.prune;
        config.decode.enabled |= self.decode;
        if self.max_age.is_some() {
            config.filters.max_age_days = self.max_age;
        }
        config.filters.unseen |= self.unseen;
        if !self.include.is_empty() {
            config.filters.include = Some(self.include.clone());
        }
        config.filters.exclude.extend(self.exclude.iter().cloned());
        self.decode_flags.apply(config);
    }
}

impl DecodeFlags {
    fn apply(&self, config: &mut AppConfig) {
        if self.no_text {
            config.decode.text = false;
        }
        if self.no_html {
            config.decode.html = false;
        }
        config.decode.attachments |= self.attachments;
        if let Some(size) = self.batch_size {
            config.digest.batch_size = size;
        }
    }
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone()).context("discovering paths")?;
        AppConfig::ensure_default(&paths.global_config).context("writing default config")?;
        let config = AppConfig::load(&paths).context("loading configuration")?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        builder.filter_level(self.effective_log_level());

        let force_color = matches!(self.common.color, ColorOption::Always)
            || env::var_os("FORCE_COLOR").is_some();
        let disable_color = self.common.no_color
            || matches!(self.common.color, ColorOption::Never)
            || env::var_os("NO_COLOR").is_some();

        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else if force_color {
            builder.write_style(WriteStyle::Always);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        if self.common.diagnostics {
            builder.format_timestamp_millis();
            builder.format_module_path(true);
            builder.format_target(true);
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => LevelFilter::Info,
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn structured_output(&self) -> bool {
        self.common.json || self.common.yaml
    }

    fn use_color(&self) -> bool {
        if self.common.no_color
            || self.common.color == ColorOption::Never
            || env::var_os("NO_COLOR").is_some()
        {
            return false;
        }
        self.common.color == ColorOption::Always || io::stdout().is_terminal()
    }
}

fn handle_download(ctx: &RuntimeContext, args: DownloadArgs) -> Result<()> {
    let mut config = ctx.config.clone();
    args.apply(&mut config);
    config.validate().context("invalid options")?;

    let opts = RunOptions::from_config(&config, &args.username, Local::now().date_naive())
        .context("resolving archive options")?;

    let mut session = ImapSession::connect(
        &config.imap.host,
        config.imap.port,
        &args.username,
        &args.password,
    )
    .with_context(|| format!("logging in to {}:{}", config.imap.host, config.imap.port))?;

    let structured = ctx.structured_output();
    let color = ctx.use_color();
    let report = archive_account(&mut session, &opts, |folder| {
        if !structured {
            print_folder(folder, color);
        }
    })?;

    if structured {
        return emit_output(&ctx.common, &report);
    }
    print_summary(&report, color);
    Ok(())
}

/// Run one pass and end the session. The session is closed on failure too.
fn archive_account<R, F>(remote: &mut R, opts: &RunOptions, on_folder: F) -> Result<RunReport>
where
    R: RemoteMailbox,
    F: FnMut(&FolderReport),
{
    let result = Archiver::new(remote, opts).run_with(on_folder);
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            // the pass error is what matters; a failing logout adds nothing
            let _ = remote.close();
            return Err(anyhow::Error::new(err).context("archiving account"));
        }
    };
    remote.close().context("closing session")?;
    Ok(report)
}

fn handle_export(ctx: &RuntimeContext, args: ExportArgs) -> Result<()> {
    let report = export_folder(&args.dir)
        .with_context(|| format!("exporting {}", args.dir.display()))?;

    if ctx.structured_output() {
        return emit_output(&ctx.common, &report);
    }
    for container in &report.containers {
        println!("{}", container.display());
    }
    println!(
        "Exported {} messages into {} mbox files",
        report.messages,
        report.containers.len()
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct DecodeSummary {
    out_dir: PathBuf,
    decode: DecodeReport,
    digest: Option<Digest>,
}

fn handle_decode(ctx: &RuntimeContext, args: DecodeArgs) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(anyhow!("not a directory: {}", args.dir.display()));
    }

    let mut config = ctx.config.clone();
    args.decode_flags.apply(&mut config);
    config.validate().context("invalid options")?;

    let out_dir = match &args.out {
        Some(out) => out.clone(),
        None => default_decode_dir(&config, &args.dir)?,
    };
    info!("decoding {} into {}", args.dir.display(), out_dir.display());

    let store = MessageStore::open(&args.dir)?;
    let opts = config.decode.options();
    let decode = decode_folder(&store, &out_dir, opts)
        .with_context(|| format!("decoding {}", args.dir.display()))?;

    let digest = if opts.html {
        Some(
            render(
                &out_dir,
                &decode.html_files,
                config.digest.batch_size,
                &config.digest.markers(),
            )
            .context("rendering digest")?,
        )
    } else {
        None
    };

    let summary = DecodeSummary {
        out_dir,
        decode,
        digest,
    };
    if ctx.structured_output() {
        return emit_output(&ctx.common, &summary);
    }

    println!(
        "Decoded {} messages ({} failed) into {}",
        summary.decode.decoded,
        summary.decode.failed,
        summary.out_dir.display()
    );
    if let Some(digest) = &summary.digest {
        print_digest(digest);
    }
    Ok(())
}

/// `<root>/<output_dir>/<dir relative to root>` for folders inside the
/// archive root, `<dir>/<output_dir>` otherwise.
fn default_decode_dir(config: &AppConfig, dir: &Path) -> Result<PathBuf> {
    let root = config.archive_root()?;
    let relative = match (fs::canonicalize(&root), fs::canonicalize(dir)) {
        (Ok(root), Ok(dir)) => dir
            .strip_prefix(&root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf),
        _ => None,
    };
    Ok(match relative {
        Some(relative) => root.join(&config.decode.output_dir).join(relative),
        None => dir.join(&config.decode.output_dir),
    })
}

fn handle_digest(ctx: &RuntimeContext, args: DigestArgs) -> Result<()> {
    let batch_size = args.batch_size.unwrap_or(ctx.config.digest.batch_size);
    let inputs = digest_inputs(&args.dir)
        .with_context(|| format!("listing decoded files in {}", args.dir.display()))?;
    let digest = render(&args.dir, &inputs, batch_size, &ctx.config.digest.markers())
        .context("rendering digest")?;

    if ctx.structured_output() {
        return emit_output(&ctx.common, &digest);
    }
    print_digest(&digest);
    Ok(())
}

fn print_folder(folder: &FolderReport, color: bool) {
    use owo_colors::OwoColorize;

    if color {
        println!("Mailbox: {}", folder.name.bold());
    } else {
        println!("Mailbox: {}", folder.name);
    }
    print_stats(&folder.stats, color);

    if let Some(export) = &folder.export {
        println!("  Exported: {} messages", export.messages);
    }
    if let Some(decode) = &folder.decode {
        println!("  Decoded: {} ({} failed)", decode.decoded, decode.failed);
    }
    if let Some(digest) = &folder.digest {
        println!("  {}", digest_line(digest));
    }
    println!();
}

fn digest_line(digest: &Digest) -> String {
    format!(
        "Digest: {} ({} batches, {} unreadable)",
        digest.summary_path.display(),
        digest.batches.len(),
        digest.failed
    )
}

fn print_stats(stats: &FolderStats, color: bool) {
    use owo_colors::OwoColorize;

    if color && stats.failed > 0 {
        println!("  Saved: {}", stats.saved.green());
        println!("  Skipped: {}", stats.skipped.dimmed());
        println!("  Failed: {}", stats.failed.red().bold());
        println!("  Removed: {}", stats.removed);
        println!("  Total: {}", stats.total);
    } else if color {
        println!("  Saved: {}", stats.saved.green());
        println!("  Skipped: {}", stats.skipped.dimmed());
        println!("  Failed: {}", stats.failed);
        println!("  Removed: {}", stats.removed);
        println!("  Total: {}", stats.total);
    } else {
        println!("{stats}");
    }
}

fn print_summary(report: &RunReport, color: bool) {
    use owo_colors::OwoColorize;

    for skipped in &report.skipped {
        if color {
            println!("{} {}: {}", "Skipped".yellow(), skipped.name, skipped.reason);
        } else {
            println!("Skipped {}: {}", skipped.name, skipped.reason);
        }
    }

    let totals = report.totals();
    println!(
        "{} folders, {} saved, {} skipped, {} failed, {} removed",
        report.folders.len(),
        totals.saved,
        totals.skipped,
        totals.failed,
        totals.removed
    );
}

fn print_digest(digest: &Digest) {
    println!("{}", digest.summary_path.display());
    for batch in &digest.batches {
        println!(
            "  Batch {}: letters {}-{} -> {}",
            batch.number,
            batch.start,
            batch.end,
            batch.path.display()
        );
    }
    if digest.failed > 0 {
        println!("  {} files could not be read", digest.failed);
    }
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => emit_output(&ctx.common, &ctx.config),
        ConfigCommand::Path => {
            println!("{}", ctx.paths.global_config.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            AppConfig::write_default(&ctx.paths.global_config).context("resetting config")
        }
    }
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.global_config.exists() && !cmd.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.global_config.display()
        ));
    }
    AppConfig::write_default(&ctx.paths.global_config).context("writing default config")?;
    println!("wrote {}", ctx.paths.global_config.display());
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn emit_output<T: ?Sized + Serialize + std::fmt::Debug>(
    opts: &CommonOpts,
    value: &T,
) -> Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(value)?;
        println!("{json}");
        return Ok(());
    }
    if opts.yaml {
        let yaml = serde_yaml::to_string(value)?;
        println!("{yaml}");
        return Ok(());
    }

    let toml = toml_display(value)?;
    println!("{toml}");
    Ok(())
}

/// Human form for plain `config show`: pretty JSON is the fallback for
/// values TOML cannot hold.
fn toml_display<T: ?Sized + Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(render_object(&map, "")),
        other => Ok(serde_json::to_string_pretty(&other)?),
    }
}

fn render_object(map: &serde_json::Map<String, serde_json::Value>, prefix: &str) -> String {
    let mut out = String::new();
    for (key, value) in map {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            serde_json::Value::Object(inner) => out.push_str(&render_object(inner, &key)),
            serde_json::Value::Null => out.push_str(&format!("{key} = (unset)\n")),
            other => out.push_str(&format!("{key} = {other}\n")),
        }
    }
    out
}
