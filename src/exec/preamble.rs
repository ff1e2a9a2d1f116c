//! Instrumentation preamble prepended ahead of user code when artifact
//! capture is requested.
//!
//! The preamble redirects interactive chart rendering (`pyplot.show`,
//! `plotly.io.show`) to file writes under the plots directory. It is a
//! fixed string; its line count is ordinary data handed to the traceback
//! sanitizer so fault lines can be remapped back to user numbering.

/// Ends with a newline so concatenating it ahead of user code shifts line
/// numbers by exactly [`line_count`].
pub const PREAMBLE: &str = r#"import os as _os
_plots_dir = _os.environ.get("TABEXEC_PLOTS_DIR", ".")
_plot_format = _os.environ.get("TABEXEC_PLOT_FORMAT", "png")
try:
    import matplotlib as _mpl
    _mpl.use("Agg")
    import matplotlib.pyplot as _plt
    def _tabexec_show(*_a, **_k):
        for _n in _plt.get_fignums():
            _plt.figure(_n).savefig(_os.path.join(_plots_dir, "figure_%d.png" % _n))
    _plt.show = _tabexec_show
except Exception:
    pass
try:
    import plotly.io as _pio
    def _tabexec_plotly_show(_fig, *_a, **_k):
        _p = _os.path.join(_plots_dir, "plot_%d.%s" % (len(artifact_manifest) + 1, _plot_format))
        if _plot_format == "json":
            _fig.write_json(_p)
        else:
            _fig.write_html(_p)
        artifact_manifest.append(_p)
    _pio.show = _tabexec_plotly_show
except Exception:
    pass
"#;

/// Number of lines the preamble shifts user code down by.
pub fn line_count() -> usize {
    PREAMBLE.lines().count()
}
