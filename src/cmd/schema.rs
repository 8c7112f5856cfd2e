//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::io::AsyncWriteExt as _;

use crate::{
    chain::{InvokeRequest, InvokeResponse},
    intake::envelope::{Fragment, ResponseEnvelope},
    prelude::*,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// A single-document OCR response.
    ResponseEnvelope,
    /// One entry of a bulk OCR response.
    Fragment,
    /// A `/chain/invoke` request.
    InvokeRequest,
    /// A `/chain/invoke` response.
    InvokeResponse,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    // Get our schema.
    let schema = match schema_opts.schema_type {
        SchemaType::ResponseEnvelope => schema_for!(ResponseEnvelope),
        SchemaType::Fragment => schema_for!(Fragment),
        SchemaType::InvokeRequest => schema_for!(InvokeRequest),
        SchemaType::InvokeResponse => schema_for!(InvokeResponse),
    };
    let mut schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    schema_str.push('\n');

    // Write out our schema.
    match &schema_opts.output_path {
        Some(path) => tokio::fs::write(path, schema_str)
            .await
            .with_context(|| format!("failed to write schema to {:?}", path.display()))?,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(schema_str.as_bytes())
                .await
                .context("failed to write schema")?;
            stdout.flush().await.context("failed to flush schema")?;
        }
    }
    Ok(())
}
