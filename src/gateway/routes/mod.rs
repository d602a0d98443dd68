// SPDX-License-Identifier: MIT
pub mod logs;
pub mod orientation;
pub mod playlist;
pub mod service;
pub mod status;
pub mod url;
