mod model;
mod record;

pub use model::{
    CareView, ColorwayView, FitClass, FitRoundView, FitRow, MaterialGroup, MaterialRow,
    ProductView, RenderModel, SizeRow, SizeTable, StepView, SummaryStats,
};
pub use record::{
    CareInstructions, Colorway, ConstructionStep, DocumentRecord, FitEntry, FitRound, Material,
    MeasurementPoint, MeasurementTable, Product,
};
