use thiserror::Error;

use super::fret_trace::*;
use super::trace_loader::*;

/// Session-wide trace collection. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct TraceSet {
    traces: Vec<FretTrace>,
    bleaching_params: PhotobleachingFilterValues,
}

impl TraceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn insert(&mut self, trace: FretTrace) -> Result<(), TraceSetError> {
        if self.position(trace.get_name()).is_some() {
            return Err(TraceSetError::DuplicateName { name: trace.get_name().to_string() });
        }
        self.traces.push(trace);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<FretTrace> {
        let idx = self.position(name)?;
        Some(self.traces.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&FretTrace> {
        self.position(name).map(|idx| &self.traces[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FretTrace> {
        self.position(name).map(move |idx| &mut self.traces[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FretTrace> {
        self.traces.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FretTrace> {
        self.traces.iter_mut()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.traces.iter().position(|trace| trace.get_name() == name)
    }

    pub fn set_checked(&mut self, name: &str, checked: bool) -> Result<(), TraceSetError> {
        let trace = self.get_mut(name).ok_or_else(|| TraceSetError::TraceNotFound { name: name.to_string() })?;
        trace.set_checked(checked);
        Ok(())
    }

    pub fn check_all(&mut self) {
        self.traces.iter_mut().for_each(|trace| trace.set_checked(true));
    }

    pub fn uncheck_all(&mut self) {
        self.traces.iter_mut().for_each(|trace| trace.set_checked(false));
    }

    pub fn n_checked(&self) -> usize {
        self.traces.iter().filter(|trace| trace.is_checked()).count()
    }

    /// Snapshot of the checked traces, in collection order.
    pub fn checked_traces(&self) -> Vec<FretTrace> {
        self.traces.iter().filter(|trace| trace.is_checked()).cloned().collect()
    }

    /// Stoichiometry of every checked trace is (re)computed and cached on the trace.
    pub fn calculate_checked_stoi(&mut self) {
        for trace in self.traces.iter_mut().filter(|trace| trace.is_checked()) {
            trace.calculate_stoi();
        }
    }

    pub fn set_bleaching_params(&mut self, params: PhotobleachingFilterValues) {
        self.bleaching_params = params;
    }

    pub fn detect_bleaching(&mut self) {
        for trace in self.traces.iter_mut() {
            let [grn, red] = trace.detect_bleaching(&self.bleaching_params);
            log::debug!("{}: donor bleach {:?}, acceptor bleach {:?}", trace.get_name(), grn, red);
        }
    }

    pub fn add_trace_from_file(&mut self, file_path: &str) -> Result<(), TraceSetError> {
        let trace = parse_file(file_path).map_err(|err| TraceSetError::TraceLoaderError { err })?;
        self.insert(trace)
    }

    /// Loads every trace file in `dir`. Files that fail are reported together, the rest stay loaded.
    pub fn add_traces_from_dir(&mut self, dir: &str) -> Result<(), TraceSetError> {
        match load_traces_from_directory(dir) {
            Ok(traces) => {
                for trace in traces {
                    self.insert(trace)?;
                }
                Ok(())
            }
            Err(TraceLoaderError::FailedToLoadFiles { successful_traces, failed_files }) => {
                for trace in successful_traces {
                    self.insert(trace)?;
                }
                Err(TraceSetError::FailedToLoadFiles { fails: failed_files })
            }
            Err(err) => Err(TraceSetError::TraceLoaderError { err }),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TraceSetError {
    #[error("a trace named '{name}' is already loaded")]
    DuplicateName { name: String },
    #[error("no trace named '{name}'")]
    TraceNotFound { name: String },
    #[error(transparent)]
    TraceLoaderError { err: TraceLoaderError },
    #[error("{} file(s) failed to load", .fails.len())]
    FailedToLoadFiles { fails: Vec<(String, TraceLoaderError)> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(name: &str) -> FretTrace {
        FretTrace::new(name, vec![10.0; 5], vec![10.0; 5], Some(vec![20.0; 5])).unwrap()
    }

    #[test]
    fn test_checked_traces_keep_order() {
        let mut set = TraceSet::new();
        for name in ["c", "a", "b"] {
            set.insert(trace(name)).unwrap();
        }
        set.set_checked("b", true).unwrap();
        set.set_checked("c", true).unwrap();

        let names: Vec<String> = set.checked_traces().iter().map(|t| t.get_name().to_string()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(set.n_checked(), 2);
    }

    #[test]
    fn test_none_checked() {
        let mut set = TraceSet::new();
        for name in ["a", "b", "c"] {
            set.insert(trace(name)).unwrap();
        }
        assert!(set.checked_traces().is_empty());

        set.check_all();
        assert_eq!(set.checked_traces().len(), 3);
        set.uncheck_all();
        assert_eq!(set.n_checked(), 0);
    }

    #[test]
    fn test_duplicate_and_missing_names() {
        let mut set = TraceSet::new();
        set.insert(trace("a")).unwrap();
        assert!(matches!(set.insert(trace("a")), Err(TraceSetError::DuplicateName { .. })));
        assert!(matches!(set.set_checked("zzz", true), Err(TraceSetError::TraceNotFound { .. })));

        assert!(set.remove("a").is_some());
        assert!(set.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut set = TraceSet::new();
        set.insert(trace("a")).unwrap();
        set.check_all();

        let snapshot = set.checked_traces();
        set.uncheck_all();
        assert!(snapshot[0].is_checked());
    }

    #[test]
    fn test_calculate_checked_stoi() {
        let mut set = TraceSet::new();
        set.insert(trace("a")).unwrap();
        set.insert(trace("b")).unwrap();
        set.set_checked("a", true).unwrap();

        set.calculate_checked_stoi();
        assert!(set.get("a").unwrap().get_stoi().is_some());
        assert!(set.get("b").unwrap().get_stoi().is_none());
    }
}
