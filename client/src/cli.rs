use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{
    adapter_for, CreateTaskRequest, DisplayMode, DocumentKind, EngineStats, GlossaryTerm, PreviewPair, ProgressInfo,
    RetryTaskRequest, TaskConfig, TaskInfo, TaskResult, TranslationContext,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::env;

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "doctrans")]
#[command(about = "CLI para hablar con el motor de traducción")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Envía un documento a traducir
    Submit {
        /// Ruta del documento, tal como la ve el master
        #[arg(value_name = "ARCHIVO")]
        file: String,

        #[arg(long)]
        target_lang: String,

        #[arg(long, default_value = "auto")]
        source_lang: String,

        #[arg(long, value_parser = parse_mode, default_value = "replace")]
        mode: DisplayMode,

        #[arg(long, default_value = "general")]
        domain: String,

        #[arg(long, default_value_t = 5)]
        concurrency: u32,

        #[arg(long)]
        prompt: Option<String>,

        /// Términos `origen=destino`, se puede repetir
        #[arg(long, value_parser = parse_term)]
        glossary: Vec<GlossaryTerm>,
    },
    /// Progreso de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista las tareas, la más reciente primero
    List,
    /// Ruta del documento traducido
    #[command(name = "result")]
    Output {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Pares origen / traducción
    Preview {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Crea una tarea nueva sobre el mismo documento
    Retry {
        #[arg(value_name = "TASK_ID")]
        id: String,

        #[command(flatten)]
        overrides: RetryArgs,
    },
    Cancel {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    Delete {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    Stats,
    /// Extrae los segmentos de un documento local, sin pasar por el master
    Segments {
        #[arg(value_name = "ARCHIVO")]
        file: String,
    },
}

#[derive(Args)]
struct RetryArgs {
    #[arg(long)]
    target_lang: Option<String>,
    #[arg(long)]
    source_lang: Option<String>,
    #[arg(long, value_parser = parse_mode)]
    mode: Option<DisplayMode>,
    #[arg(long)]
    domain: Option<String>,
    #[arg(long)]
    concurrency: Option<u32>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long, value_parser = parse_term)]
    glossary: Vec<GlossaryTerm>,
}

impl From<RetryArgs> for RetryTaskRequest {
    fn from(a: RetryArgs) -> Self {
        RetryTaskRequest {
            target_lang: a.target_lang,
            source_lang: a.source_lang,
            display_mode: a.mode,
            concurrency: a.concurrency,
            domain: a.domain,
            prompt: a.prompt,
            glossary: if a.glossary.is_empty() { None } else { Some(a.glossary) },
        }
    }
}

fn parse_mode(s: &str) -> Result<DisplayMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "replace" => Ok(DisplayMode::Replace),
        "parallel" => Ok(DisplayMode::Parallel),
        other => Err(format!("modo desconocido: {other} (replace | parallel)")),
    }
}

fn parse_term(s: &str) -> Result<GlossaryTerm, String> {
    match s.split_once('=') {
        Some((src, dst)) if !src.trim().is_empty() && !dst.trim().is_empty() => Ok(GlossaryTerm {
            source: src.trim().to_string(),
            target: dst.trim().to_string(),
        }),
        _ => Err(format!("término inválido: {s} (se espera origen=destino)")),
    }
}

/// Lee el cuerpo JSON o convierte `{"error": ...}` en error.
async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let msg = body["error"].as_str().unwrap_or("sin detalle");
    Err(anyhow!("el master respondió {}: {}", status, msg))
}

fn print_task(t: &TaskInfo) {
    println!("Tarea:");
    println!("  id: {}", t.id);
    println!("  origen: {} ({:?})", t.source_ref, t.document_kind);
    println!(
        "  idiomas: {} → {} ({:?})",
        t.config.source_lang, t.config.target_lang, t.config.display_mode
    );
    println!("  estado: {:?}", t.status);
    println!("  progreso: {}% ({}/{})", t.progress, t.done_count, t.total_count);
    if let Some(ref from) = t.retried_from {
        println!("  reintento de: {}", from);
    }
    if let Some(ref err) = t.error_message {
        println!("  error: {} ({:?})", err, t.error_code);
    }
    if let Some(ref out) = t.output_ref {
        println!("  salida: {}", out);
    }
    println!("  submitted_at: {}", t.submitted_at);
    if let Some(ref started) = t.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(ref done) = t.finished_at {
        println!("  finalizado: {}", done);
    }
}

fn print_progress(p: &ProgressInfo) {
    println!("  estado: {:?}", p.status);
    println!("  progreso: {}% ({}/{})", p.progress, p.done_count, p.total_count);
    if let Some(ref err) = p.error_message {
        println!("  error: {} ({:?})", err, p.error_code);
    }
}

fn segments_of(file: &str) -> Result<()> {
    let kind = DocumentKind::from_path(file).ok_or_else(|| anyhow!("formato no soportado: {file}"))?;
    let bytes = std::fs::read(file).with_context(|| format!("no se pudo leer {file}"))?;
    let segments = adapter_for(kind).extract(&bytes)?;

    println!("{} segmentos en {}", segments.len(), file);
    for s in &segments {
        println!("[{}] {} ({:?}): {}", s.index(), s.location(), s.kind(), s.source_text());
    }
    Ok(())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit {
            file,
            target_lang,
            source_lang,
            mode,
            domain,
            concurrency,
            prompt,
            glossary,
        } => {
            let req = CreateTaskRequest {
                source_ref: file,
                config: TaskConfig {
                    target_lang,
                    source_lang,
                    display_mode: mode,
                    concurrency,
                    context: TranslationContext { domain, prompt, glossary },
                },
            };
            let url = format!("{}/api/v1/tasks", base_url);
            let task: TaskInfo = parse(client.post(&url).json(&req).send().await?).await?;
            println!("Tarea creada con {} segmentos", task.total_count);
            print_task(&task);
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/tasks/{id}", base_url);
            let task: TaskInfo = parse(client.get(&url).send().await?).await?;
            print_task(&task);
        }

        Commands::List => {
            let url = format!("{}/api/v1/tasks", base_url);
            let tasks: Vec<TaskInfo> = parse(client.get(&url).send().await?).await?;
            if tasks.is_empty() {
                println!("No hay tareas");
            }
            for t in tasks {
                println!(
                    "{}  {:<10} {:>3}%  {} → {}",
                    t.id,
                    format!("{:?}", t.status),
                    t.progress,
                    t.source_ref,
                    t.config.target_lang
                );
            }
        }

        Commands::Output { id } => {
            let url = format!("{}/api/v1/tasks/{id}/result", base_url);
            let result: TaskResult = parse(client.get(&url).send().await?).await?;
            println!("{}", result.output_ref);
        }

        Commands::Preview { id } => {
            let url = format!("{}/api/v1/tasks/{id}/preview", base_url);
            let pairs: Vec<PreviewPair> = parse(client.get(&url).send().await?).await?;
            for p in pairs {
                println!("[{}] {}", p.index, p.source);
                if p.translated.is_empty() {
                    println!("    (sin traducir)");
                } else {
                    println!("    {}", p.translated);
                }
            }
        }

        Commands::Retry { id, overrides } => {
            let url = format!("{}/api/v1/tasks/{id}/retry", base_url);
            let req: RetryTaskRequest = overrides.into();
            let task: TaskInfo = parse(client.post(&url).json(&req).send().await?).await?;
            println!("Reintento creado");
            print_task(&task);
        }

        Commands::Cancel { id } => {
            let url = format!("{}/api/v1/tasks/{id}/cancel", base_url);
            let p: ProgressInfo = parse(client.post(&url).send().await?).await?;
            println!("Tarea {} cancelada", id);
            print_progress(&p);
        }

        Commands::Delete { id } => {
            let url = format!("{}/api/v1/tasks/{id}", base_url);
            let resp = client.delete(&url).send().await?;
            if !resp.status().is_success() {
                let body: serde_json::Value = resp.json().await.unwrap_or_default();
                bail!("no se pudo borrar {id}: {}", body["error"].as_str().unwrap_or("sin detalle"));
            }
            println!("Tarea {} borrada", id);
        }

        Commands::Stats => {
            let url = format!("{}/api/v1/stats", base_url);
            let s: EngineStats = parse(client.get(&url).send().await?).await?;
            println!("Tareas: {}", s.total);
            println!("  pending: {}", s.pending);
            println!("  processing: {}", s.processing);
            println!("  completed: {}", s.completed);
            println!("  failed: {}", s.failed);
        }

        Commands::Segments { file } => segments_of(&file)?,
    }

    Ok(())
}
