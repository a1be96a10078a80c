//! Job-level tests driving the transformation loop with in-memory collaborators


mod job_flow;
