use ndarray::Array2;

#[derive(Default, Clone, Copy)]
pub(crate) struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub(crate) fn add(&mut self, value: f64) {
        let y = value - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub(crate) fn sum(self) -> f64 {
        self.sum
    }
}

/// Sum of `ln|d|` over the pivots, compensated so long grids of
/// near-identical matrices do not drift.
pub(crate) fn sum_log_abs<'a, I>(pivots: I) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut acc = KahanSum::default();
    for &d in pivots {
        acc.add(d.abs().ln());
    }
    acc.sum()
}

/// Numerical solves can leave tiny asymmetry in matrices that are symmetric
/// in exact arithmetic; average the two triangles.
pub(crate) fn symmetrize_in_place(matrix: &mut Array2<f64>) {
    let p = matrix.nrows().min(matrix.ncols());
    for i in 0..p {
        for j in (i + 1)..p {
            let avg = 0.5 * (matrix[[i, j]] + matrix[[j, i]]);
            matrix[[i, j]] = avg;
            matrix[[j, i]] = avg;
        }
    }
}
