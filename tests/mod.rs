mod smoke_tests;

// This file organizes the integration tests into a cohesive test suite.
// Each module tests a specific aspect of the engine:
// - smoke_tests: Configuration plus the merge, identity and conflict behavior
// - provider_mock: The sync actor driven by mocked providers and directories
