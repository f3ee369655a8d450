use crate::admin::AstraAdmin;
use crate::error::{AutomationError, AutomationResult};
use crate::protocol::{AstraMethodInfo, ExperimentId, SampleInfo};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

const COLUMNS: usize = 12;

/// One enabled row of a run-sequence sheet.
///
/// Columns: Enable, Name, Description, Injection, Method, Duration, InjVol, dn/dc, A2, UVExt,
/// Conc, FlowRate.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceEntry {
    pub method: String,
    pub injections: u32,
    pub duration: f64,
    pub injected_volume: f64,
    pub flow_rate: f64,
    pub sample: SampleInfo,
}

impl SequenceEntry {
    /// `injection` counts from 1.
    pub fn experiment_file_name(&self, injection: u32) -> String {
        let base = if self.sample.name.is_empty() {
            "untitled"
        } else {
            self.sample.name.as_str()
        };
        if self.injections > 1 {
            format!("{base} ({injection} of {})", self.injections)
        } else {
            base.to_string()
        }
    }

    fn method_info(&self, experiment_path: String) -> AstraMethodInfo {
        AstraMethodInfo {
            experiment_path,
            sample: self.sample.clone(),
            injected_volume: self.injected_volume,
            flow_rate: self.flow_rate,
            duration: self.duration,
        }
    }
}

pub fn read_sequence(path: &Path) -> AutomationResult<Vec<SequenceEntry>> {
    read_sequence_from(File::open(path)?)
}

/// Parses a sequence sheet. Disabled rows and rows with the wrong column count are skipped.
pub fn read_sequence_from<R: Read>(reader: R) -> AutomationResult<Vec<SequenceEntry>> {
    let mut csv = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in csv.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() != COLUMNS {
            warn!(line, columns = record.len(), "skipping malformed sequence row");
            continue;
        }
        if record[0].eq_ignore_ascii_case("false") {
            continue;
        }
        entries.push(parse_row(&record, line)?);
    }
    Ok(entries)
}

fn parse_row(record: &StringRecord, line: u64) -> AutomationResult<SequenceEntry> {
    let number = |index: usize, column: &str| -> AutomationResult<f64> {
        record[index]
            .parse()
            .map_err(|_| AutomationError::Sequence {
                line,
                message: format!("{column} {:?} is not a number", &record[index]),
            })
    };
    let injections: u32 = record[3].parse().map_err(|_| AutomationError::Sequence {
        line,
        message: format!("Injection {:?} is not a count", &record[3]),
    })?;

    Ok(SequenceEntry {
        method: record[4].to_string(),
        injections,
        duration: number(5, "Duration")?,
        injected_volume: number(6, "InjVol")?,
        flow_rate: number(11, "FlowRate")?,
        sample: SampleInfo {
            name: record[1].to_string(),
            description: record[2].to_string(),
            dndc: number(7, "dn/dc")?,
            a2: number(8, "A2")?,
            uv_extinction: number(9, "UVExt")?,
            concentration: number(10, "Conc")?,
        },
    })
}

impl AstraAdmin {
    /// Collects every injection of every entry, saving each experiment under `output_dir`.
    pub fn run_sequence(
        &self,
        entries: &[SequenceEntry],
        output_dir: &Path,
        progress: &mut dyn FnMut(&str),
    ) -> AutomationResult<Vec<ExperimentId>> {
        let mut collected = Vec::new();
        for entry in entries {
            for injection in 1..=entry.injections {
                let path = output_dir.join(entry.experiment_file_name(injection));
                let info = entry.method_info(path.to_string_lossy().into_owned());
                info!(method = %entry.method, injection, of = entry.injections, "sequence injection");
                if let Some(experiment_id) = self.collect_data(&entry.method, &info, progress)? {
                    collected.push(experiment_id);
                }
            }
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Enable,Name,Description,Injection,Method,Duration,InjVol,dn/dc,A2,UVExt,Conc,FlowRate\n";

    #[test]
    fn disabled_and_short_rows_are_skipped() {
        let sheet = format!(
            "{HEADER}\
             TRUE,BSA,monomer,2,//dbf/System/Online/light scattering,5,0.1,0.185,0,0.667,2.0,0.5\n\
             FALSE,skip me,,1,//dbf/System/Online/light scattering,5,0.1,0.185,0,0,1,0.5\n\
             TRUE,too short,,1\n\
             true,,blank name,1,//dbf/System/Online/light scattering,1.5,0.05,0.15,0.0001,0,1,-1\n"
        );
        let entries = read_sequence_from(sheet.as_bytes()).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sample.name, "BSA");
        assert_eq!(entries[0].injections, 2);
        assert_eq!(entries[0].sample.uv_extinction, 0.667);
        assert_eq!(entries[1].flow_rate, -1.0);
        assert_eq!(entries[1].sample.description, "blank name");
    }

    #[test]
    fn bad_numbers_report_the_line() {
        let sheet = format!("{HEADER}TRUE,BSA,,1,method,five,0.1,0.185,0,0,1,0.5\n");
        match read_sequence_from(sheet.as_bytes()) {
            Err(AutomationError::Sequence { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("Duration"), "{message}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_names_number_repeated_injections() {
        let mut entry = SequenceEntry {
            method: "m".to_string(),
            injections: 3,
            duration: 1.0,
            injected_volume: 0.1,
            flow_rate: 0.5,
            sample: SampleInfo {
                name: "BSA".to_string(),
                ..SampleInfo::default()
            },
        };
        assert_eq!(entry.experiment_file_name(2), "BSA (2 of 3)");
        entry.injections = 1;
        entry.sample.name.clear();
        assert_eq!(entry.experiment_file_name(1), "untitled");
    }
}
