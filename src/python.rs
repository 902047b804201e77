//! The `_pygdb` Python extension module.
//!
//! `_pygdb.breakpoint_mark()` is the call site GDB breaks on. The
//! `_pygdb.breakpoint` submodule holds a thread until the GDB console has
//! attached before calling it.

use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::error::Error;
use crate::marker;

impl From<Error> for PyErr {
    fn from(err: Error) -> PyErr {
        PyRuntimeError::new_err(err.to_string())
    }
}

/// Used for python GDB breakpoints.
#[pyfunction]
fn breakpoint_mark() {
    marker::breakpoint_mark();
}

#[cfg(unix)]
mod breakpoint {
    use std::sync::Arc;

    use ::log::Level;
    use pyo3::prelude::*;

    use crate::gate;
    use crate::logging::{self, LogConfig, LogLine, Sink};

    /// Builds a sink forwarding to `logger` if it is a `logging.Logger`.
    fn logger_sink(logger: &Bound<'_, PyAny>) -> PyResult<Option<Sink>> {
        let logger_type = logger.py().import_bound("logging")?.getattr("Logger")?;
        if !logger.is_instance(&logger_type)? {
            return Ok(None);
        }

        let logger = logger.clone().unbind();
        let sink: Sink = Arc::new(move |line: &LogLine<'_>| {
            let method = match line.level {
                Level::Error => "error",
                Level::Warn => "warning",
                Level::Info => "info",
                Level::Debug | Level::Trace => "debug",
            };
            Python::with_gil(|py| {
                if let Err(err) = logger.call_method1(py, method, (line.message,)) {
                    err.print(py);
                }
            });
        });
        Ok(Some(sink))
    }

    /// Enable breakpoints and start listening for the GDB console.
    #[pyfunction]
    #[pyo3(signature = (logger=None))]
    fn enable(py: Python<'_>, logger: Option<&Bound<'_, PyAny>>) -> PyResult<bool> {
        let sink = match logger {
            Some(logger) => logger_sink(logger)?,
            None => None,
        };
        let config = LogConfig {
            sink,
            ..LogConfig::default()
        };
        // The sink needs the GIL, and another thread may hold the GIL while
        // waiting on the gate's setup lock.
        Ok(py.allow_threads(|| gate::enable(config))?)
    }

    /// Set logger used for breakpoint messages. Only a `logging.Logger` is accepted.
    #[pyfunction]
    fn set_logger(logger: &Bound<'_, PyAny>) -> PyResult<bool> {
        if !gate::is_enabled() {
            return Ok(false);
        }
        match logger_sink(logger)? {
            Some(sink) => {
                logging::set_sink(Some(sink));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Breakpoint; blocks until the GDB console is connected.
    #[pyfunction]
    #[pyo3(signature = (logger=None))]
    fn set(py: Python<'_>, logger: Option<&Bound<'_, PyAny>>) -> PyResult<()> {
        if !gate::is_enabled() {
            return Ok(());
        }
        if let Some(logger) = logger {
            set_logger(logger)?;
        }
        py.allow_threads(gate::set);
        Ok(())
    }

    /// Log an info message tagged with process and thread id.
    #[pyfunction]
    #[pyo3(name = "log")]
    fn log_message(message: &str) {
        gate::log(message);
    }

    #[pyfunction]
    fn is_enabled() -> bool {
        gate::is_enabled()
    }

    #[pyfunction]
    fn console_attached() -> bool {
        gate::console_attached()
    }

    pub(super) fn register(parent: &Bound<'_, PyModule>) -> PyResult<()> {
        let module = PyModule::new_bound(parent.py(), "breakpoint")?;
        module.add_function(wrap_pyfunction!(enable, &module)?)?;
        module.add_function(wrap_pyfunction!(set_logger, &module)?)?;
        module.add_function(wrap_pyfunction!(set, &module)?)?;
        module.add_function(wrap_pyfunction!(log_message, &module)?)?;
        module.add_function(wrap_pyfunction!(is_enabled, &module)?)?;
        module.add_function(wrap_pyfunction!(console_attached, &module)?)?;
        parent.add_submodule(&module)?;

        // Lets `import _pygdb.breakpoint` find it although `_pygdb` is not a package.
        parent
            .py()
            .import_bound("sys")?
            .getattr("modules")?
            .set_item("_pygdb.breakpoint", &module)
    }
}

/// Used for python GDB breakpoints.
#[pymodule]
#[pyo3(name = "_pygdb")]
fn pygdb_module(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_function(wrap_pyfunction!(breakpoint_mark, module)?)?;
    #[cfg(unix)]
    breakpoint::register(module)?;
    Ok(())
}
