pub mod conv2d_relu;
pub mod conv_stage;
