//! Choice of the azimuthal sample count per element

/// Decides how many azimuth samples an element carries
pub trait ModeTruncation: Send + Sync + std::fmt::Debug {
    /// Sample count of global element `element`, given the mesh value
    fn nr(&self, element: usize, mesh_nr: usize) -> usize;
}

/// Take `nr` from the mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshNr;

impl ModeTruncation for MeshNr {
    fn nr(&self, _element: usize, mesh_nr: usize) -> usize {
        mesh_nr
    }
}

/// Same `nr` everywhere, whatever the mesh says
#[derive(Debug, Clone, Copy)]
pub struct UniformNr(pub usize);

impl ModeTruncation for UniformNr {
    fn nr(&self, _element: usize, _mesh_nr: usize) -> usize {
        self.0
    }
}
