use crate::output;

use color_eyre::Result;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use modelci_service::execution::{
    ExecutionEvent, JobStatus, LogLevel, ProgressReceiver, StepStatus,
};

/// Exit code used when the run is interrupted with Ctrl-C
const INTERRUPTED: i32 = 130;

/// Render events until the task finishes, then return its output.
///
/// Ctrl-C aborts the task (which kills any running child processes) and exits.
pub async fn drive<T>(mut handle: JoinHandle<T>, rx: ProgressReceiver) -> Result<T> {
    let mut events = UnboundedReceiverStream::new(rx);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => render(&event),
                None => break,
            },
            _ = &mut ctrl_c => {
                println!();
                output::error("Interrupted, cancelling running jobs");
                handle.abort();
                let _ = (&mut handle).await;
                std::process::exit(INTERRUPTED);
            }
        }
    }

    Ok(handle.await?)
}

/// Print one progress event
pub fn render(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::FanoutStarted {
            total_jobs,
            variant,
        } => {
            println!();
            output::header(&format!("Running {} jobs ({})", total_jobs, variant));
        }

        ExecutionEvent::FanoutCompleted {
            succeeded,
            failed,
            duration,
        } => {
            println!();
            if *failed == 0 {
                output::success(&format!(
                    "{} jobs succeeded in {:.2}s",
                    succeeded,
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "{} of {} jobs failed after {:.2}s",
                    failed,
                    succeeded + failed,
                    duration.as_secs_f64()
                ));
            }
        }

        ExecutionEvent::JobStarted {
            job_name,
            runner_label,
            total_steps,
            ..
        } => {
            output::job_header(job_name, runner_label, *total_steps);
        }

        ExecutionEvent::JobCompleted {
            job_name,
            status,
            reached,
            duration,
        } => {
            let reached = reached
                .map(|state| state.to_string())
                .unwrap_or_else(|| "nothing".to_string());
            let line = format!(
                "    Job '{}' {} ({:.2}s, reached {})",
                job_name,
                if *status == JobStatus::Succeeded { "OK" } else { "FAIL" },
                duration.as_secs_f64(),
                reached
            );
            if *status == JobStatus::Succeeded {
                output::dim_success(&line);
            } else {
                output::dim_failure(&line);
            }
        }

        ExecutionEvent::StepStarted {
            job_name,
            step_name,
            step_index,
        } => {
            println!("      [{}] [Step {}] {}", job_name, step_index + 1, step_name);
        }

        ExecutionEvent::StepOutput {
            output, is_error, ..
        } => {
            for line in output.lines() {
                if *is_error {
                    output::step_error(line);
                } else {
                    output::step_output(line);
                }
            }
        }

        ExecutionEvent::StepCompleted {
            status,
            duration,
            exit_code,
            ..
        } => {
            let symbol = match status {
                StepStatus::Succeeded => "OK",
                StepStatus::Failed => "FAIL",
                StepStatus::Skipped => "SKIP",
            };
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                _ => String::new(),
            };
            let line = format!(
                "        {} ({:.2}s){}",
                symbol,
                duration.as_secs_f64(),
                exit_info
            );
            match status {
                StepStatus::Succeeded => output::dim_success(&line),
                StepStatus::Failed => output::dim_failure(&line),
                StepStatus::Skipped => println!("{}", line),
            }
        }

        ExecutionEvent::StepSkipped {
            step_name, reason, ..
        } => {
            output::warning(&format!("        {} skipped: {}", step_name, reason));
        }

        ExecutionEvent::Log {
            level,
            message,
            job_name,
        } => {
            let message = match job_name {
                Some(job) => format!("[{}] {}", job, message),
                None => message.clone(),
            };
            match level {
                LogLevel::Info => output::info(&message),
                LogLevel::Warning => output::warning(&message),
            }
        }

        ExecutionEvent::Error {
            message, job_name, ..
        } => match job_name {
            Some(job) => output::error(&format!("[{}] {}", job, message)),
            None => output::error(message),
        },
    }
}
