use std::sync::atomic::Ordering;

use difi_stream::{DifiSource, SourceConfig};
use tracing::info;

use crate::cmd::{install_ctrlc_handler, load_config, ListenArgs};
use crate::exit::{stream_error, CliResult, SUCCESS};
use crate::output::{print_batch, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = source_config(&args)?;
    let mut source =
        DifiSource::bind(config).map_err(|err| stream_error("source setup failed", err))?;
    let running = install_ctrlc_handler()?;

    let mut printed = 0u64;

    while running.load(Ordering::SeqCst) {
        let offset = source.samples_delivered();
        let batch = source
            .work(args.chunk)
            .map_err(|err| stream_error("receive failed", err))?;
        if batch.is_empty() {
            continue;
        }

        print_batch(&batch, offset, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    info!(batches = printed, samples = source.samples_delivered(), "listen finished");
    Ok(SUCCESS)
}

fn source_config(args: &ListenArgs) -> CliResult<SourceConfig> {
    let mut config: SourceConfig = load_config(args.config.as_deref())?;
    config.addr = args.addr;
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if args.stream_id.is_some() {
        config.stream_id = args.stream_id;
    }
    if let Some(bit_depth) = args.bit_depth {
        config.bit_depth = bit_depth;
    }
    if let Some(policy) = args.context_policy {
        config.context_policy = policy;
    }
    if let Some(timeout) = args.read_timeout_ms {
        config.read_timeout_ms = timeout;
    }
    Ok(config)
}
