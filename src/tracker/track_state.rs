/// Crossing state of a track. `Counted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Not yet counted; evaluated against the line every frame
    #[default]
    Active,
    /// Crossed the line once; never evaluated again
    Counted,
}
