//! The `list-tensors` command: prints the name, shape and data type of every tensor in a container.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    path::PathBuf,
};

use clap::Parser;
use serde::Serialize;
use thiserror::Error;

use crate::container::{
    Container, ContainerBuilder, ContainerError, MAX_HEADER_SIZE, Source, TensorDescriptor,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// List the tensors stored in a safetensors container.
#[derive(Parser, Debug, Clone)]
#[command(name = "list-tensors")]
#[command(version)]
#[command(about, long_about = None)]
pub struct Args {
    /// Path to the container file.
    pub path: PathBuf,

    /// Also print the free-form header metadata.
    #[arg(long)]
    pub metadata: bool,

    /// Print a JSON report instead of text.
    #[arg(long)]
    pub json: bool,

    /// Read every tensor payload, failing on truncated data.
    #[arg(long)]
    pub verify: bool,

    /// Reject containers whose payload has bytes not owned by any tensor.
    #[arg(long)]
    pub contiguous: bool,

    /// Largest header length accepted, in bytes.
    #[arg(long, default_value_t = MAX_HEADER_SIZE)]
    pub max_header_size: u64,
}

impl Args {
    pub fn builder(&self) -> ContainerBuilder {
        ContainerBuilder::new()
            .max_header_size(self.max_header_size)
            .contiguous(self.contiguous)
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    path: String,
    tensors: &'a [TensorDescriptor],
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a BTreeMap<String, String>>,
}

/// Runs the command, writing the listing to `out`.
pub fn run(args: &Args, out: &mut impl Write) -> Result<(), CliError> {
    let mut container = args.builder().open_path(&args.path)?;
    if args.verify {
        verify(&container)?;
    }

    let path = args.path.display().to_string();
    let tensors = container.descriptors()?;
    let metadata = args.metadata.then(|| container.metadata()).transpose()?;

    if args.json {
        let report = Report {
            path,
            tensors,
            metadata,
        };
        serde_json::to_writer_pretty(&mut *out, &report).map_err(io::Error::from)?;
        writeln!(out)?;
    } else {
        writeln!(out, "Tensors in {path}:")?;
        for descriptor in tensors {
            writeln!(
                out,
                "{}: shape={}, dtype={}",
                descriptor.name(),
                descriptor.shape(),
                descriptor.data_type()
            )?;
        }
        if let Some(metadata) = metadata {
            writeln!(out, "Metadata:")?;
            for (key, value) in metadata {
                writeln!(out, "{key} = {value}")?;
            }
        }
    }

    container.close();
    Ok(())
}

fn verify<S: Source>(container: &Container<S>) -> Result<(), ContainerError> {
    for name in container.keys()? {
        let tensor = container.get_tensor(name)?;
        log::debug!("verified {name}: {} bytes", tensor.data().len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io::Write};

    use clap::Parser;

    use super::{Args, CliError, run};
    use crate::container::{ContainerError, FormatError};

    fn container(header: &str, payload: &[u8]) -> Vec<u8> {
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn fixture(bytes: &[u8]) -> Result<tempfile::NamedTempFile, Box<dyn Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }

    fn list(file: &tempfile::NamedTempFile, flags: &[&str]) -> Result<String, CliError> {
        let path = file.path().to_str().expect("utf-8 temp path");
        let args = Args::parse_from(["list-tensors", path].iter().chain(flags));
        let mut out = Vec::new();
        run(&args, &mut out)?;
        Ok(String::from_utf8(out).expect("utf-8 output"))
    }

    const HEADER: &str = r#"{
        "__metadata__": {"format": "pt"},
        "embed": {"dtype": "BF16", "shape": [4, 2], "data_offsets": [0, 16]},
        "bias": {"dtype": "F32", "shape": [2], "data_offsets": [16, 24]}
    }"#;

    #[test]
    fn test_list_text() -> Result<(), Box<dyn Error>> {
        let file = fixture(&container(HEADER, &[0; 24]))?;
        let output = list(&file, &["--verify", "--metadata"])?;
        let expected = format!(
            "Tensors in {}:\n\
             embed: shape=[4, 2], dtype=bfloat16\n\
             bias: shape=[2], dtype=float32\n\
             Metadata:\n\
             format = pt\n",
            file.path().display()
        );
        assert_eq!(output, expected);
        Ok(())
    }

    #[test]
    fn test_list_json() -> Result<(), Box<dyn Error>> {
        let file = fixture(&container(HEADER, &[0; 24]))?;
        let output = list(&file, &["--json"])?;
        let report: serde_json::Value = serde_json::from_str(&output)?;
        assert_eq!(report["tensors"][0]["name"], "embed");
        assert_eq!(report["tensors"][0]["dtype"], "BF16");
        assert_eq!(report["tensors"][1]["shape"], serde_json::json!([2]));
        assert_eq!(report["tensors"][1]["data_offsets"], serde_json::json!([16, 24]));
        assert!(report.get("metadata").is_none());
        Ok(())
    }

    #[test]
    fn test_list_corrupt() -> Result<(), Box<dyn Error>> {
        let file = fixture(&container(HEADER, &[0; 20]))?;
        assert!(matches!(
            list(&file, &[]),
            Err(CliError::Container(ContainerError::Format(FormatError::Bounds(..))))
        ));

        let gap = fixture(&container(HEADER, &[0; 28]))?;
        assert!(list(&gap, &[]).is_ok());
        assert!(matches!(
            list(&gap, &["--contiguous"]),
            Err(CliError::Container(ContainerError::Format(FormatError::Gap(24, 28))))
        ));
        Ok(())
    }
}
