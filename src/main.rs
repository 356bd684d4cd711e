use std::{
    fs,
    io::{self, IsTerminal, Read, Write},
    path::Path,
    process,
};

use tikzmagic::{
    application::{
        error::AppError,
        render::{
            DisplayData, MagicArgs, RenderOutput, RenderRequest, RenderService, TikzRenderService,
            Toolchain, assemble_document, parse_magic_line,
        },
    },
    config::{self, CellIo, Command, OutputFormat},
    infra::{error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, error_code = error.code(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, error_code = error.code(), "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let service = TikzRenderService::new(Toolchain::from(&settings.toolchain));

    match cli_args.command {
        Command::Render(args) => run_render(&service, args.magic, &args.io),
        Command::Magic(args) => {
            let magic = parse_magic_line(&args.line)?;
            run_render(&service, magic, &args.io)
        }
        Command::Template(args) => run_template(args.magic, args.cell.as_deref()),
    }
}

fn run_render(service: &dyn RenderService, magic: MagicArgs, io: &CellIo) -> Result<(), AppError> {
    let cell = read_cell(io.cell.as_deref())?;
    let request = RenderRequest::from_args(magic, &cell)?;
    let output = service.render(&request)?;

    info!(
        target = "tikzmagic::render",
        density = output.density,
        png_bytes = output.png.len(),
        elapsed_ms = output.elapsed.as_millis() as u64,
        exported_pdf = ?output.exported_pdf,
        "Render complete"
    );

    let bytes = encode_output(&output, io.format)?;
    write_output(io.output.as_deref(), &bytes)
}

fn run_template(magic: MagicArgs, cell: Option<&Path>) -> Result<(), AppError> {
    let cell = read_cell(cell)?;
    let request = RenderRequest::from_args(magic, &cell)?;
    let document = assemble_document(&request);
    write_output(None, document.as_str().as_bytes())
}

/// Read the cell body from a file, or from stdin when it is piped. An
/// interactive terminal yields an empty body, like a line magic without a cell.
fn read_cell(path: Option<&Path>) -> Result<String, AppError> {
    if let Some(path) = path {
        return fs::read_to_string(path).map_err(|err| AppError::from(InfraError::from(err)));
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }

    let mut cell = String::new();
    stdin
        .lock()
        .read_to_string(&mut cell)
        .map_err(InfraError::from)?;
    Ok(cell)
}

fn encode_output(output: &RenderOutput, format: OutputFormat) -> Result<Vec<u8>, AppError> {
    match format {
        OutputFormat::Png => Ok(output.png.clone()),
        OutputFormat::DisplayData => {
            let mut json = serde_json::to_vec_pretty(&DisplayData::from_png(&output.png))
                .map_err(InfraError::from)?;
            json.push(b'\n');
            Ok(json)
        }
    }
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<(), AppError> {
    match path {
        Some(path) => fs::write(path, bytes).map_err(InfraError::from)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes).map_err(InfraError::from)?;
            stdout.flush().map_err(InfraError::from)?;
        }
    }
    Ok(())
}
