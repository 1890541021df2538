use crate::error::{CliError, Result};
use ndarray::{Array2, Array4, ArrayView2, Zip, s};
use ndarray_npy::{NpzWriter, write_npy};
use num_complex::Complex64;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use stemslice::core::grid::FourierGrid;
use stemslice::core::io::sink::{
    DatacubeRecord, DatacubeSink, DiffractionPattern, ProbeSink, SinkError,
};
use tracing::debug;

enum Datacube {
    Intensity(Array4<f64>),
    Wave(Array4<Complex64>),
}

impl Datacube {
    fn zeros(pattern: &DiffractionPattern, scan: (usize, usize)) -> Self {
        let (a, b) = pattern.dim();
        let shape = (scan.0, scan.1, a, b);
        match pattern {
            DiffractionPattern::Intensity(_) => Self::Intensity(Array4::zeros(shape)),
            DiffractionPattern::Wave(_) => Self::Wave(Array4::zeros(shape)),
        }
    }

    fn pattern_dim(&self) -> (usize, usize) {
        let shape = match self {
            Self::Intensity(cube) => cube.shape(),
            Self::Wave(cube) => cube.shape(),
        };
        (shape[2], shape[3])
    }
}

/// In-memory 4D datasets, indexed `[x_probe, y_probe, qx, qy]`, filled by the
/// engine and written out once the run has finished.
///
/// Intensity datasets are averaged over frozen-phonon configurations as they
/// arrive. Complex datasets are overwritten, since every configuration writes
/// its own dataset.
pub struct DatacubeCollector {
    scan: (usize, usize),
    datasets: Mutex<BTreeMap<String, Datacube>>,
}

impl DatacubeCollector {
    /// `scan_nx` and `scan_ny` are the probe counts along x and y.
    pub fn new(scan_nx: usize, scan_ny: usize) -> Self {
        Self {
            scan: (scan_nx, scan_ny),
            datasets: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Writes every dataset into one `.npz` archive, keyed by the last
    /// component of the dataset identifier.
    pub fn write_npz(&self, path: &Path) -> Result<usize> {
        let datasets = self.lock();
        let file = File::create(path)?;
        let mut writer = NpzWriter::new(file);
        let map_err = |e: ndarray_npy::WriteNpzError| CliError::FileWriting {
            path: path.to_path_buf(),
            source: e.into(),
        };

        for (name, cube) in datasets.iter() {
            let key = name.rsplit('/').next().unwrap_or(name);
            match cube {
                Datacube::Intensity(cube) => writer.add_array(key, cube).map_err(map_err)?,
                Datacube::Wave(cube) => writer.add_array(key, cube).map_err(map_err)?,
            }
        }
        writer.finish().map_err(map_err)?;
        Ok(datasets.len())
    }

    #[cfg(test)]
    fn intensity(&self, name: &str) -> Option<Array4<f64>> {
        match self.lock().get(name) {
            Some(Datacube::Intensity(cube)) => Some(cube.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Datacube>> {
        self.datasets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DatacubeSink for DatacubeCollector {
    fn write_datacube(&self, record: DatacubeRecord<'_>) -> std::result::Result<(), SinkError> {
        let rejected = |reason: String| SinkError::Rejected {
            name: record.name.to_string(),
            reason,
        };
        let (a, b) = record.pattern.dim();
        if record.dims != [1, 1, a, b] {
            return Err(rejected(format!(
                "write extent {:?} does not match a {a}x{b} pattern",
                record.dims
            )));
        }
        let [x, y, ..] = record.offset;
        if x >= self.scan.0 || y >= self.scan.1 {
            return Err(rejected(format!(
                "probe cell ({x}, {y}) lies outside the {}x{} scan",
                self.scan.0, self.scan.1
            )));
        }

        let mut datasets = self.lock();
        let cube = datasets
            .entry(record.name.to_string())
            .or_insert_with(|| Datacube::zeros(record.pattern, self.scan));
        if cube.pattern_dim() != (a, b) {
            return Err(rejected(format!(
                "pattern is {a}x{b} but the dataset holds {:?} patterns",
                cube.pattern_dim()
            )));
        }

        match (cube, record.pattern, record.running_average) {
            (
                Datacube::Intensity(cube),
                DiffractionPattern::Intensity(pattern),
                DiffractionPattern::Intensity(average),
            ) => {
                let weight = 1.0 / record.num_configurations.max(1) as f64;
                Zip::from(&mut *average)
                    .and(pattern)
                    .for_each(|avg, &value| *avg = value * weight);
                let mut cell = cube.slice_mut(s![x, y, .., ..]);
                cell += &*average;
            }
            (Datacube::Wave(cube), DiffractionPattern::Wave(pattern), _) => {
                cube.slice_mut(s![x, y, .., ..]).assign(pattern);
            }
            _ => {
                return Err(rejected(
                    "pattern kind differs from the existing dataset".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Holds the initial probe snapshot until the run is written out.
#[derive(Default)]
pub struct ProbeCollector {
    probe: Mutex<Option<Array2<Complex64>>>,
}

impl ProbeCollector {
    pub fn into_probe(self) -> Option<Array2<Complex64>> {
        self.probe
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProbeSink for ProbeCollector {
    fn save_probe(
        &self,
        probe: ArrayView2<'_, Complex64>,
        grid: &FourierGrid,
    ) -> std::result::Result<(), SinkError> {
        debug!(ny = grid.ny(), nx = grid.nx(), "Captured initial probe.");
        *self.probe.lock().unwrap_or_else(PoisonError::into_inner) = Some(probe.to_owned());
        Ok(())
    }
}

pub fn write_array<A, D>(path: &Path, array: &ndarray::Array<A, D>) -> Result<()>
where
    A: ndarray_npy::WritableElement,
    D: ndarray::Dimension,
{
    write_npy(path, array).map_err(|e| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

/// Writes a two-column table with an index column.
pub fn write_table(path: &Path, header: [&str; 2], values: &[f64]) -> Result<()> {
    let map_err = |e: csv::Error| CliError::FileWriting {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(map_err)?;
    wtr.write_record(header).map_err(map_err)?;
    for (index, value) in values.iter().enumerate() {
        wtr.write_record([index.to_string(), format!("{:.6}", value)])
            .map_err(map_err)?;
    }
    wtr.flush()?;
    Ok(())
}
