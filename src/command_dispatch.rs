//! Purpose: Hold top-level CLI command dispatch for `intstack`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each invocation issues exactly one device operation (or one drain).
//! Invariants: An empty stack is a successful outcome, never an error.

use clap::CommandFactory;
use intstack::api::{DeviceClient, Pop, device_present};

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    device: PathBuf,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "intstack", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Status => {
            emit_json(
                json!({
                    "device": device.display().to_string(),
                    "present": device_present(&device),
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Serve { attached } => {
            let config = serve::ServeConfig { device, attached };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::SetSize { size } => {
            if size <= 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("size should be > 0")
                    .with_hint("Use a positive capacity, e.g. `intstack set-size 8`."));
            }
            DeviceClient::open(&device)?.set_size(size)?;
            Ok(RunOutcome::ok())
        }
        Command::Push { value } => {
            DeviceClient::open(&device)?
                .push(value)
                .map_err(add_full_hint)?;
            Ok(RunOutcome::ok())
        }
        Command::Pop => {
            match DeviceClient::open(&device)?.pop()? {
                Pop::Value(value) => println!("{value}"),
                Pop::Empty => println!("NULL"),
            }
            Ok(RunOutcome::ok())
        }
        Command::Unwind => {
            let mut client = DeviceClient::open(&device)?;
            while let Pop::Value(value) = client.pop()? {
                println!("{value}");
            }
            Ok(RunOutcome::ok())
        }
    }
}

fn add_full_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Full {
        return err;
    }
    err.with_message("stack is full")
        .with_hint("Pop values or grow the stack with `intstack set-size <n>`.")
}
