/// Which slices emit an output record, and at what depth.
///
/// After slice `a` (1-based) a layer is recorded when
/// `(a % slices_per_output == 0 && a >= z_start_plane) || a == num_planes`.
/// Layers are numbered in the order they are emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayers {
    emitting_slices: Vec<usize>,
    layer_of_slice: Vec<Option<usize>>,
    depths: Vec<f64>,
}

impl OutputLayers {
    /// `slices_per_output = None` records the exit surface only.
    pub fn new(
        num_planes: usize,
        slices_per_output: Option<usize>,
        z_start_plane: usize,
        slice_thickness: f64,
    ) -> Self {
        let group = slices_per_output.unwrap_or(num_planes).max(1);
        let mut emitting_slices = Vec::new();
        let mut layer_of_slice = vec![None; num_planes + 1];
        for a in 1..=num_planes {
            if (a % group == 0 && a >= z_start_plane) || a == num_planes {
                layer_of_slice[a] = Some(emitting_slices.len());
                emitting_slices.push(a);
            }
        }
        let depths = emitting_slices
            .iter()
            .map(|&a| a as f64 * slice_thickness)
            .collect();
        Self {
            emitting_slices,
            layer_of_slice,
            depths,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.emitting_slices.len()
    }

    /// Layer recorded after 1-based slice `slice`, if any.
    #[inline]
    pub fn layer_after(&self, slice: usize) -> Option<usize> {
        self.layer_of_slice.get(slice).copied().flatten()
    }

    pub fn emitting_slices(&self) -> &[usize] {
        &self.emitting_slices
    }

    /// Depth of every layer in Å.
    pub fn depths(&self) -> &[f64] {
        &self.depths
    }
}
