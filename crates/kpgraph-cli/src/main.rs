//! kpgraph CLI - knowledge point graph store for course content

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use clap::{Parser, Subcommand};
use kpgraph_core::config::Config;
use kpgraph_core::domain::caller::Caller;
use kpgraph_core::domain::course::CourseRepository;
use kpgraph_core::domain::knowledge::{
    DifficultyLevel, GraphIngestionAdapter, KnowledgePoint, KnowledgePointService,
    NewKnowledgePoint,
};
use kpgraph_core::infrastructure::course::SqliteCourseRepository;
use kpgraph_core::infrastructure::knowledge::{
    LlmKnowledgeCollaborator, SqliteKnowledgePointRepository,
};
use kpgraph_core::infrastructure::knowledge_point_service;
use kpgraph_core::llm::LlmClient;
use kpgraph_core::storage::{Database, DatabaseConfig};
use serde::Serialize;
use tracing::{debug, warn};

type Service = KnowledgePointService<SqliteKnowledgePointRepository>;

#[derive(Parser)]
#[command(name = "kpgraph")]
#[command(author, version, about = "Knowledge point graph store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (defaults to the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage courses
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Manage knowledge points
    Kp {
        #[command(subcommand)]
        action: KpAction,
    },

    /// Extract knowledge points from a course text file with the LLM
    Ingest {
        /// Course that receives the knowledge points
        #[arg(short, long)]
        course: i64,
        /// Plain text course material
        file: PathBuf,
    },

    /// Ask the LLM for study suggestions from per-knowledge-point scores
    Recommend {
        #[arg(short, long)]
        student: i64,
        #[arg(short, long)]
        course: i64,
        /// Score for one knowledge point, as `<id>=<score>`
        #[arg(long = "score", value_parser = parse_score)]
        scores: Vec<(i64, f64)>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum CourseAction {
    /// Create a course
    Add {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// List all courses
    List,
}

#[derive(Subcommand)]
enum KpAction {
    /// Create a knowledge point
    Add {
        name: String,
        #[arg(short, long)]
        course: i64,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<DifficultyLevel>,
        /// Prerequisite ids, comma separated
        #[arg(long, value_delimiter = ',')]
        prereqs: Vec<i64>,
        /// Related ids, comma separated
        #[arg(long, value_delimiter = ',')]
        related: Vec<i64>,
    },
    /// Show knowledge point details
    Show { id: i64 },
    /// List knowledge points
    List {
        #[arg(short, long)]
        course: Option<i64>,
    },
    /// Update a knowledge point; omitted fields keep their value
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<DifficultyLevel>,
        /// Replace prerequisites; pass the flag alone to clear them
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        prereqs: Option<Vec<i64>>,
        /// Replace related ids; pass the flag alone to clear them
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        related: Option<Vec<i64>>,
    },
    /// Delete a knowledge point and every reference to it
    Delete { id: i64 },
    /// Show a course's graph and a learning order
    Graph {
        #[arg(short, long)]
        course: i64,
    },
    /// Scan stored edges for dangling and self references
    Check {
        #[arg(short, long)]
        course: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_difficulty(s: &str) -> Result<DifficultyLevel, String> {
    DifficultyLevel::parse(s).ok_or_else(|| {
        format!("unknown difficulty '{s}' (expected beginner, intermediate or advanced)")
    })
}

fn parse_score(s: &str) -> Result<(i64, f64), String> {
    let (id, score) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <id>=<score>, got '{s}'"))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid knowledge point id '{id}'"))?;
    let score = score
        .trim()
        .parse()
        .map_err(|_| format!("invalid score '{score}'"))?;
    Ok((id, score))
}

/// Everything a graph command needs
struct AppContext {
    config: Config,
    db: Database,
    service: Arc<Service>,
    format: OutputFormat,
    quiet: bool,
}

impl AppContext {
    async fn open(db_path: Option<&Path>, format: OutputFormat, quiet: bool) -> anyhow::Result<Self> {
        let config = Config::load()?;
        let mut db_config = DatabaseConfig::from(&config.database);
        if let Some(path) = db_path {
            db_config.path = path.to_path_buf();
        }
        let db = Database::new(db_config).await?;
        let service = Arc::new(knowledge_point_service(db.pool().clone(), &config));
        Ok(Self {
            config,
            db,
            service,
            format,
            quiet,
        })
    }

    fn courses(&self) -> SqliteCourseRepository {
        SqliteCourseRepository::new(self.db.pool().clone())
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    async fn require_course(&self, course_id: i64) -> anyhow::Result<()> {
        if self.courses().get(course_id).await?.is_none() {
            return Err(kpgraph_core::Error::CourseNotFound(course_id).into());
        }
        Ok(())
    }

    fn ingestion(&self) -> anyhow::Result<GraphIngestionAdapter<SqliteKnowledgePointRepository>> {
        let client = LlmClient::from_config(&self.config.llm)?;
        debug!(model = client.model(), "LLM client ready");
        Ok(GraphIngestionAdapter::new(
            Arc::clone(&self.service),
            Arc::new(LlmKnowledgeCollaborator::new(client)),
        ))
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kpgraph=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.as_deref();

    match cli.command {
        Commands::Course { action } => {
            let ctx = AppContext::open(db_path, cli.format, cli.quiet).await?;
            cmd_course(&ctx, action).await
        }

        Commands::Kp { action } => {
            let ctx = AppContext::open(db_path, cli.format, cli.quiet).await?;
            cmd_kp(&ctx, action).await
        }

        Commands::Ingest { course, file } => {
            let ctx = AppContext::open(db_path, cli.format, cli.quiet).await?;
            cmd_ingest(&ctx, course, &file).await
        }

        Commands::Recommend {
            student,
            course,
            scores,
        } => {
            let ctx = AppContext::open(db_path, cli.format, cli.quiet).await?;
            cmd_recommend(&ctx, student, course, scores).await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(db_path, cli.quiet).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_course(ctx: &AppContext, action: CourseAction) -> anyhow::Result<()> {
    let courses = ctx.courses();
    match action {
        CourseAction::Add { name, description } => {
            let course = courses.create(&name, description.as_deref()).await?;
            if ctx.json() {
                print_json(&course)?;
            } else if !ctx.quiet {
                println!("Course created.");
                println!("  ID: {}", course.id);
                println!("  Name: {}", course.name);
            } else {
                println!("{}", course.id);
            }
        }
        CourseAction::List => {
            let all = courses.list().await?;
            if ctx.json() {
                print_json(&all)?;
            } else if all.is_empty() {
                if !ctx.quiet {
                    println!("No courses found.");
                    println!("\nCreate one with: kpgraph course add <name>");
                }
            } else {
                for course in all {
                    println!("  {} - {}", course.id, course.name);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_kp(ctx: &AppContext, action: KpAction) -> anyhow::Result<()> {
    let caller = Caller::system();
    let service = &ctx.service;

    match action {
        KpAction::Add {
            name,
            course,
            description,
            content,
            difficulty,
            prereqs,
            related,
        } => {
            ctx.require_course(course).await?;
            let mut new_point = NewKnowledgePoint::new(name, course)
                .with_prerequisites(prereqs)
                .with_related(related);
            if let Some(description) = description {
                new_point = new_point.with_description(description);
            }
            if let Some(content) = content {
                new_point = new_point.with_content(content);
            }
            if let Some(difficulty) = difficulty {
                new_point = new_point.with_difficulty(difficulty);
            }

            let point = service.create_knowledge_point(&caller, new_point).await?;
            if ctx.json() {
                print_json(&point)?;
            } else if ctx.quiet {
                println!("{}", point.id);
            } else {
                println!("Knowledge point created.");
                print_point(&point);
            }
        }

        KpAction::Show { id } => {
            let point = service
                .get_knowledge_point(id)
                .await?
                .ok_or(kpgraph_core::Error::KnowledgePointNotFound(id))?;
            if ctx.json() {
                print_json(&point)?;
            } else {
                print_point(&point);
            }
        }

        KpAction::List { course } => {
            let points = match course {
                Some(course_id) => service.list_by_course(course_id).await?,
                None => service.list_all().await?,
            };
            if ctx.json() {
                print_json(&points)?;
            } else if points.is_empty() {
                if !ctx.quiet {
                    println!("No knowledge points found.");
                }
            } else {
                for point in points {
                    println!(
                        "  {} - {} [{}] (prereqs: {})",
                        point.id,
                        point.name,
                        point.difficulty,
                        format_ids(&point.prerequisite_ids)
                    );
                }
            }
        }

        KpAction::Update {
            id,
            name,
            description,
            content,
            difficulty,
            prereqs,
            related,
        } => {
            let mut point = service
                .get_knowledge_point(id)
                .await?
                .ok_or(kpgraph_core::Error::KnowledgePointNotFound(id))?;
            if let Some(name) = name {
                point.name = name;
            }
            if let Some(description) = description {
                point.brief_description = description;
            }
            if let Some(content) = content {
                point.detailed_content = content;
            }
            if let Some(difficulty) = difficulty {
                point.difficulty = difficulty;
            }
            if let Some(prereqs) = prereqs {
                point.prerequisite_ids = prereqs;
            }
            if let Some(related) = related {
                point.related_ids = related;
            }

            let point = service.update_knowledge_point(&caller, point).await?;
            if ctx.json() {
                print_json(&point)?;
            } else if !ctx.quiet {
                println!("Knowledge point {} updated.", point.id);
            }
        }

        KpAction::Delete { id } => {
            let report = service.delete_knowledge_point(&caller, id).await?;
            if ctx.json() {
                print_json(&report)?;
            } else if !ctx.quiet {
                println!("Knowledge point {} deleted.", id);
                println!(
                    "  Removed as prerequisite from: {}",
                    format_ids(&report.prerequisite_refs_removed)
                );
                println!(
                    "  Removed as related from: {}",
                    format_ids(&report.related_refs_removed)
                );
            }
        }

        KpAction::Graph { course } => {
            let graph = service.course_graph(course).await?;
            let order = graph.learning_order();
            if ctx.json() {
                print_json(&serde_json::json!({
                    "graph": graph,
                    "learningOrder": order,
                }))?;
                return Ok(());
            }

            println!(
                "Course {}: {} knowledge points, {} edges",
                graph.course_id,
                graph.nodes.len(),
                graph.edges.len()
            );
            for edge in &graph.edges {
                println!("  {} -> {} ({})", edge.source, edge.target, edge.kind);
            }
            let external = graph.external_targets();
            if !external.is_empty() {
                println!("  Edges into other courses: {}", format_ids(&external));
            }
            match order {
                Some(order) => println!("Learning order: {}", format_ids(&order)),
                None => {
                    warn!(course_id = course, "Prerequisite cycle in course graph");
                    println!("Learning order: none (prerequisites form a cycle)");
                }
            }
        }

        KpAction::Check { course } => {
            let report = service.check_integrity(course).await?;
            if ctx.json() {
                print_json(&report)?;
            } else {
                if !ctx.quiet {
                    println!("Checked {} knowledge points.", report.nodes_checked);
                }
                for broken in &report.dangling {
                    println!(
                        "[!!] {} lists missing {} {}",
                        broken.source, broken.kind, broken.target
                    );
                }
                for broken in &report.self_references {
                    println!("[!!] {} lists itself as {}", broken.source, broken.kind);
                }
                if report.is_clean() && !ctx.quiet {
                    println!("[OK] No broken references.");
                }
            }
            if !report.is_clean() {
                return Err(anyhow!(
                    "{} broken references found",
                    report.dangling.len() + report.self_references.len()
                ));
            }
        }
    }
    Ok(())
}

fn print_point(point: &KnowledgePoint) {
    println!("Knowledge point: {}", point.name);
    println!("  ID: {}", point.id);
    match &point.course_name {
        Some(course_name) => println!("  Course: {} ({})", course_name, point.course_id),
        None => println!("  Course: {}", point.course_id),
    }
    println!(
        "  Difficulty: {} - {}",
        point.difficulty,
        point.difficulty.description()
    );
    if !point.brief_description.is_empty() {
        println!("  Description: {}", point.brief_description);
    }
    println!("  Prerequisites: {}", format_ids(&point.prerequisite_ids));
    println!("  Related: {}", format_ids(&point.related_ids));
    println!("  Created: {}", point.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", point.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

async fn cmd_ingest(ctx: &AppContext, course_id: i64, file: &Path) -> anyhow::Result<()> {
    ctx.require_course(course_id).await?;
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read course text: {}", file.display()))?;
    if text.trim().is_empty() {
        return Err(anyhow!("Course text file is empty: {}", file.display()));
    }

    if !ctx.quiet && !ctx.json() {
        println!("Extracting knowledge points for course {}...", course_id);
    }
    let summary = ctx
        .ingestion()?
        .ingest_course(&Caller::system(), course_id, &text)
        .await?;

    if ctx.json() {
        return print_json(&summary);
    }

    println!(
        "Ingested {} knowledge points ({} failed).",
        summary.succeeded.len(),
        summary.failed.len()
    );
    if !ctx.quiet {
        for point in &summary.succeeded {
            println!("  [OK] {} - {}", point.knowledge_point_id, point.name);
        }
        for failed in &summary.failed {
            println!(
                "  [!!] #{} {}: {}",
                failed.position,
                failed.name.as_deref().unwrap_or("(unparsed)"),
                failed.reason
            );
        }
        for dropped in &summary.dropped_edges {
            println!(
                "  [--] {} {} hint {} dropped: {}",
                dropped.knowledge_point_id, dropped.kind, dropped.hint, dropped.reason
            );
        }
        println!("  Batch: {}", summary.batch_id);
    }
    Ok(())
}

async fn cmd_recommend(
    ctx: &AppContext,
    student_id: i64,
    course_id: i64,
    scores: Vec<(i64, f64)>,
) -> anyhow::Result<()> {
    let performance: HashMap<i64, f64> = scores.into_iter().collect();
    let suggestions = ctx
        .ingestion()?
        .recommend_learning_content(&Caller::system(), student_id, &performance, course_id)
        .await?;

    if ctx.json() {
        return print_json(&suggestions);
    }
    if !ctx.quiet {
        println!("Suggestions for student {}:", student_id);
    }
    for (i, suggestion) in suggestions.iter().enumerate() {
        println!("  {}. {}", i + 1, suggestion);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(db_path: Option<&Path>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("kpgraph Health Check");
        println!("====================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            match config.llm.redacted_api_key() {
                Ok(Some(redacted)) => {
                    if !quiet {
                        println!("[OK] API Key: Configured ({})", redacted);
                    }
                }
                Ok(None) => {
                    if !quiet {
                        println!("[--] API Key: Not configured (needed for ingest and recommend)");
                        println!("     Set KPGRAPH_API_KEY or OPENROUTER_API_KEY environment variable");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] API Key: Error - {}", e);
                    }
                }
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            Config::default()
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    let mut db_config = DatabaseConfig::from(&config.database);
    if let Some(path) = db_path {
        db_config.path = path.to_path_buf();
    }
    match Database::new(db_config).await {
        Ok(db) => match db.health_check().await {
            Ok(()) => {
                if !quiet {
                    println!("[OK] Database: Connected");
                    println!("     Path: {}", db.path().display());
                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => println!(
                            "[!!] Database: Migrations pending (v{} -> v{})",
                            status.current_version, status.target_version
                        ),
                        Ok(status) => println!("[OK] Database: Schema v{}", status.current_version),
                        Err(e) => println!("[!!] Database: Migration check failed - {}", e),
                    }
                }

                let service = knowledge_point_service(db.pool().clone(), &config);
                match service.check_integrity(None).await {
                    Ok(report) if report.is_clean() => {
                        if !quiet {
                            println!(
                                "[OK] Graph: {} knowledge points, no broken references",
                                report.nodes_checked
                            );
                        }
                    }
                    Ok(report) => {
                        all_ok = false;
                        if !quiet {
                            println!(
                                "[!!] Graph: {} dangling and {} self references",
                                report.dangling.len(),
                                report.self_references.len()
                            );
                            println!("     Run `kpgraph kp check` for details");
                        }
                    }
                    Err(e) => {
                        all_ok = false;
                        if !quiet {
                            println!("[!!] Graph: Integrity check failed - {}", e);
                        }
                    }
                }
                db.close().await;
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
        },
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("12=45.5"), Ok((12, 45.5)));
        assert_eq!(parse_score(" 3 = 90 "), Ok((3, 90.0)));
        assert!(parse_score("12").is_err());
        assert!(parse_score("x=1").is_err());
        assert!(parse_score("1=high").is_err());
    }

    #[test]
    fn test_parse_difficulty() {
        assert_eq!(parse_difficulty("hard"), Ok(DifficultyLevel::Advanced));
        assert!(parse_difficulty("impossible").is_err());
    }

    #[test]
    fn test_update_flags_distinguish_clear_from_keep() {
        let cli = Cli::try_parse_from(["kpgraph", "kp", "update", "4", "--prereqs"]).unwrap();
        match cli.command {
            Commands::Kp {
                action: KpAction::Update {
                    prereqs, related, ..
                },
            } => {
                assert_eq!(prereqs, Some(vec![]));
                assert_eq!(related, None);
            }
            _ => panic!("expected kp update"),
        }

        let cli = Cli::try_parse_from(["kpgraph", "kp", "add", "Sets", "-c", "1", "--prereqs", "2,3"])
            .unwrap();
        match cli.command {
            Commands::Kp {
                action: KpAction::Add { prereqs, .. },
            } => assert_eq!(prereqs, vec![2, 3]),
            _ => panic!("expected kp add"),
        }
    }

    #[test]
    fn test_format_ids() {
        assert_eq!(format_ids(&[]), "-");
        assert_eq!(format_ids(&[1, 22]), "1, 22");
    }
}
