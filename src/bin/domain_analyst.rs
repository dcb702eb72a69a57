use std::env;
use std::error::Error;

use futures_util::StreamExt;
use serde_json::{Value, json};
use stepflow_rs::tools::TOOL_OUTPUT_KEY;
use stepflow_rs::tools::builtin::whois_tool;
use stepflow_rs::{
    ClientConfig, FieldType, LoopEvent, OpenAiClient, Schema, ToolRegistry, Variables, Workflow,
};
use tracing_subscriber::EnvFilter;

const SYSTEM_MESSAGE: &str = "You are an AI analyst specialized in domain analysis. Your role is to:
1. First, examine the tools available to you. These will be your only source of data.
2. Plan your analysis based ONLY on the tools you have access to.
3. For each tool:
   - State what information you plan to gather
   - Use the tool to collect the data
   - Analyze the results
4. Once you have exhausted all available tools:
   - Summarize all gathered data
   - Provide analysis based ONLY on the information collected from these tools
   - Do not make assumptions about data you cannot verify with your tools
   - Clearly state if there are important security aspects you cannot assess due to tool limitations

Important:
- Do not attempt to access external resources or tools not explicitly provided
- If you need information but don't have the appropriate tool, note this in your analysis
- Structure your findings based solely on verifiable data from your available tools

Return your analysis in the specified JSON format once you have completed your investigation or can no longer gather more data with your current tools.";

const USER_MESSAGE: &str = "Please analyze the security posture of this domain: {{domain}}. Start by gathering basic information and then dig deeper based on what you find.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let domain = env::args()
        .nth(1)
        .filter(|arg| !arg.trim().is_empty())
        .unwrap_or_else(|| "example.com".to_string());

    let api_key = env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY is not set")?;
    let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
    let mut config = ClientConfig::new(api_key, model);
    config.base_url = env::var("OPENAI_BASE_URL").ok();
    config.temperature = Some(0.1);
    config.max_tokens = 1000;
    let client = OpenAiClient::new(config)?;

    let final_schema = Schema::builder()
        .required("domain", FieldType::String, "The domain being analyzed")
        .required("analysis", FieldType::String, "Complete analysis of the domain")
        .required("security_posture", FieldType::String, "Overall security assessment")
        .required("recommendations", FieldType::String, "Recommended actions")
        .build()?;

    let tools = ToolRegistry::new().with_tool(whois_tool())?;

    let workflow = Workflow::builder().client(client).build()?;

    let mut variables = Variables::new();
    variables.insert("domain".to_string(), json!(domain));

    println!("domain: {domain}");

    let stream = workflow.chain_of_thought_stream(
        SYSTEM_MESSAGE,
        USER_MESSAGE,
        &final_schema,
        variables,
        Some(&tools),
    );
    futures_util::pin_mut!(stream);

    println!("\nAnalysis Steps:");
    while let Some(event) = stream.next().await {
        match event? {
            LoopEvent::Step {
                index,
                workflow_name,
                record,
            } => {
                println!("\nStep {}: {workflow_name}", index + 1);
                if let Some(thought) = record.non_empty_str("thought") {
                    println!("thought: {}", truncate(thought, 200));
                }
                if let Some(output) = record.get(TOOL_OUTPUT_KEY) {
                    println!("Tool Output: {}", truncate(&display(output), 400));
                }
            }
            LoopEvent::Finished(result) => {
                println!(
                    "\nloop finished: {:?} after {} steps",
                    result.status, result.step_count
                );
                println!("\nFinal Analysis:");
                for field in ["domain", "analysis", "security_posture", "recommendations"] {
                    let value = result
                        .final_output
                        .get(field)
                        .map(display)
                        .unwrap_or_default();
                    println!("{field}: {value}");
                }
            }
        }
    }

    Ok(())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
