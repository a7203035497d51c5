use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use askdb::agent::{
    Agent, chat_responder_from_config, executor_from_config, formatter_from_config,
    sql_generator_from_config,
};
use askdb::chat::{MEMORY_CLEARED, is_reset_command};
use askdb::config::Config;
use askdb::dialect::Dialect;
use askdb::executor::QueryOutcome;
use askdb::formatter::FormatInput;
use askdb::sql::wants_visualization;
use askdb::tabular::TabularResult;

#[derive(Parser)]
#[command(
    name = "askdb-cli",
    about = "askdb — ask questions about your database in plain language"
)]
struct Cli {
    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one assistant turn
    Ask {
        /// The question or message (collects remaining args)
        input: Vec<String>,
    },
    /// Interactive session; `exit` or `quit` leaves
    Chat,
    /// Print the SQL generated for a question without running it
    Generate {
        /// SQL dialect to target when no database URL is configured
        #[arg(long)]
        dialect: Option<Dialect>,
        question: Vec<String>,
    },
    /// Run a SQL statement and print the result table
    Sql {
        statement: Vec<String>,
    },
    /// Clean a JSON result file and write it to the CSV artifact
    Format {
        /// JSON file holding an array of row objects or a text string
        file: PathBuf,
    },
    /// Clear the chat memory
    Reset,
}

// ============================================================================
// Output Helpers
// ============================================================================

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn table_json(table: &TabularResult) -> Value {
    let rows: Vec<Value> = (0..table.num_rows())
        .map(|i| {
            let row = table.row(i);
            let object: serde_json::Map<String, Value> = table
                .column_names()
                .into_iter()
                .zip(row)
                .map(|(name, cell)| (name.to_string(), json!(cell)))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

/// Read one line from stdin after printing `prompt`. `None` on EOF.
fn read_line(prompt: &str) -> std::io::Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Ask { input } => {
            let mut agent = Agent::from_config(&config).map_err(|e| e.to_string())?;
            let input = input.join(" ");
            if input.trim().is_empty() {
                eprintln!("Nothing to ask.");
                return Ok(());
            }

            let response = agent.handle(&input).await?;
            if cli.json {
                let intent = agent.history().last().map(|e| e.intent);
                print_json(&json!({ "intent": intent, "response": response }))?;
            } else {
                println!("{response}");
            }
        }
        Command::Chat => {
            let mut agent = Agent::from_config(&config).map_err(|e| e.to_string())?;
            eprintln!("Type 'exit' or 'quit' to leave, 'reset' to clear memory.");
            while let Some(input) = read_line("You: ")? {
                if input.is_empty() {
                    continue;
                }
                if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
                    break;
                }
                if is_reset_command(&input) {
                    agent.chat().reset_memory().await;
                    println!("Agent: {MEMORY_CLEARED}");
                    continue;
                }

                match agent.handle(&input).await {
                    Ok(response) if cli.json => {
                        let intent = agent.history().last().map(|e| e.intent);
                        println!("{}", json!({ "intent": intent, "response": response }));
                    }
                    Ok(response) => println!("Agent: {response}"),
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
        Command::Generate { dialect, question } => {
            if dialect.is_some() {
                config.sql_dialect = dialect;
            }
            let generator = sql_generator_from_config(&config).map_err(|e| e.to_string())?;

            let question = question.join(" ");
            if wants_visualization(&question) {
                eprintln!("warning: charts are not supported; generating SQL for the data only.");
            }

            let sql = generator.generate_sql(&question).await?;
            if cli.json {
                print_json(&json!({ "question": question, "sql": sql }))?;
            } else {
                println!("{sql}");
            }
        }
        Command::Sql { statement } => {
            let statement = statement.join(" ");
            match executor_from_config(&config)?.run(&statement).await {
                QueryOutcome::Rows(table) => {
                    if cli.json {
                        print_json(&table_json(&table))?;
                    } else {
                        println!("{}", table.render());
                    }
                }
                QueryOutcome::Empty => {
                    if cli.json {
                        print_json(&json!([]))?;
                    } else {
                        eprintln!("Query returned no rows.");
                    }
                }
                QueryOutcome::Failed(message) => {
                    return Err(format!("query failed: {message}").into());
                }
            }
        }
        Command::Format { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let value: Value = serde_json::from_str(&raw)?;
            let input = FormatInput::from_json(value)?;

            let (path, table) = formatter_from_config(&config)?.format(input).await?;
            if cli.json {
                print_json(&json!({
                    "path": path.display().to_string(),
                    "rows": table_json(&table),
                }))?;
            } else {
                println!("{}", table.render());
                eprintln!("Saved to {}", path.display());
            }
        }
        Command::Reset => {
            let chat = chat_responder_from_config(&config).map_err(|e| e.to_string())?;
            chat.reset_memory().await;
            if cli.json {
                print_json(&json!({ "status": MEMORY_CLEARED }))?;
            } else {
                eprintln!("{}", MEMORY_CLEARED);
            }
        }
    }

    Ok(())
}
