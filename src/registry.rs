//! Native call map: a process-wide name-to-procedure registry, the
//! scheduler's sole indirection point for invoking commands.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::error;

use crate::commands::{self, Context};
use crate::error::HwError;
use crate::sink::DataSink;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
type Procedure = Arc<dyn for<'a> Fn(&'a Context, &'a dyn DataSink, &'a [String]) -> BoxFuture<'a> + Send + Sync>;

/// Maps a command name to its procedure. Unknown names log and return
/// without emitting records, mirroring the original's lookup-and-invoke
/// behavior.
pub struct Registry {
    procedures: HashMap<&'static str, Procedure>,
}

macro_rules! procedure {
    ($f:path) => {
        Arc::new(move |ctx: &Context, sink: &dyn DataSink, argv: &[String]| {
            Box::pin($f(ctx, sink, argv)) as BoxFuture<'_>
        })
    };
}

impl Default for Registry {
    fn default() -> Self {
        let mut procedures: HashMap<&'static str, Procedure> = HashMap::new();
        procedures.insert("read_bw", procedure!(commands::read_bw));
        procedures.insert("read_correrrcnt", procedure!(commands::read_correrrcnt));
        procedures.insert("read_dimm_temp", procedure!(commands::read_dimm_temp));
        procedures.insert("read_hwmon_temp", procedure!(commands::read_hwmon_temp));
        procedures.insert("read_scrubaddress", procedure!(commands::read_scrubaddress));
        procedures.insert("read_pmoncntr", procedure!(commands::read_pmoncntr));
        procedures.insert("read_pcicfg", procedure!(commands::read_pcicfg));
        Registry { procedures }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `name` and, if registered, invokes it with `argv` against
    /// `sink`. An unknown name is logged and otherwise a no-op.
    pub async fn invoke(&self, ctx: &Context, sink: &dyn DataSink, name: &str, argv: &[String]) {
        match self.procedures.get(name) {
            Some(proc) => proc(ctx, sink, argv).await,
            None => error!(
                "{}",
                HwError::UnknownCommand { name: name.to_string() }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_carries_every_named_procedure() {
        let registry = Registry::new();
        for name in [
            "read_bw",
            "read_correrrcnt",
            "read_dimm_temp",
            "read_hwmon_temp",
            "read_scrubaddress",
            "read_pmoncntr",
            "read_pcicfg",
        ] {
            assert!(registry.procedures.contains_key(name), "missing {}", name);
        }
    }
}
