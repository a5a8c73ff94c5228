// ABOUTME: Utility modules shared across the engine
// ABOUTME: HTTP client construction with pooling and per-purpose timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// HTTP client configuration and helpers
pub mod http_client;
