//! Fixed external contract interface.
//!
//! The factories and instance contracts are deployed and maintained
//! elsewhere; these declarations only mirror the methods and events the
//! gateway calls or decodes.

#![allow(clippy::too_many_arguments)]

use alloy_sol_types::sol;

sol! {
    /// Element of `ContriboostFactory.getContriboostDetails`.
    #[derive(Debug, PartialEq, Eq)]
    struct ContriboostDetails {
        address contractAddress;
        string name;
        uint256 dayRange;
        uint256 expectedNumber;
        uint256 contributionAmount;
        address tokenAddress;
        uint256 hostFeePercentage;
        uint256 platformFeePercentage;
        uint256 maxMissedDeposits;
    }

    /// Pool parameters passed to `createContriboost`.
    #[derive(Debug, PartialEq, Eq)]
    struct ContriboostConfig {
        uint256 dayRange;
        uint256 expectedNumber;
        uint256 contributionAmount;
        uint256 hostFeePercentage;
        uint256 platformFeePercentage;
        uint256 maxMissedDeposits;
        uint256 startTimestamp;
        uint8 paymentMethod;
    }

    /// Element of `GoalFundFactory.getAllGoalFundsDetails`.
    #[derive(Debug, PartialEq, Eq)]
    struct GoalFundDetails {
        address contractAddress;
        string name;
        uint256 targetAmount;
        uint256 currentAmount;
        uint256 deadline;
        address beneficiary;
        address tokenAddress;
        uint8 fundType;
        uint256 platformFeePercentage;
        bool achieved;
    }

    interface IContriboostFactory {
        event ContriboostCreated(address indexed contriboost, address indexed host, string name);

        function getContriboosts() external view returns (address[] memory);
        function getUserContriboosts(address user) external view returns (address[] memory);
        function getContriboostDetails(address contriboost, bool all) external view returns (ContriboostDetails[] memory);
        function getSingleContriboostDetails(address contriboost) external view returns (ContriboostDetails memory);
        function getContriboostCount() external view returns (uint256);
        function getContriboostByIndex(uint256 index) external view returns (address);
        function createContriboost(ContriboostConfig config, string name, string description, address tokenAddress) external returns (address);
    }

    interface IContriboost {
        function description() external view returns (string memory);
        function host() external view returns (address);
        function currentSegment() external view returns (uint256);
        function startTimestamp() external view returns (uint256);
        function getActiveParticipants() external view returns (address[] memory);
        function getAllParticipants() external view returns (address[] memory);
        function getParticipantStatus(address participant) external view returns (
            uint256 id,
            uint256 depositAmount,
            uint256 lastDepositTime,
            bool exists,
            bool receivedFunds,
            bool active,
            uint256 missedDeposits
        );
        function participants(address participant) external view returns (
            uint256 id,
            uint256 depositAmount,
            uint256 lastDepositTime,
            bool exists,
            bool receivedFunds,
            bool active,
            uint256 missedDeposits
        );

        function join() external payable;
        function deposit() external payable;
        function distributeFunds() external;
        function checkMissedDeposits() external;
        function exitContriboost() external;
        function emergencyWithdraw(address token) external;
        function setDescription(string newDescription) external;
        function setHostFeePercentage(uint256 newFee) external;
        function setTokenAddress(address newToken) external;
        function reactivateParticipant(address participant) external payable;
        function transferOwnership(address newOwner) external;
    }

    interface IGoalFundFactory {
        event GoalFundCreated(address indexed goalFundAddress, address indexed owner, string name);

        function getAllGoalFundsDetails() external view returns (GoalFundDetails[] memory);
        function getUserGoalFunds(address user) external view returns (address[] memory);
        function getGoalFundDetails(address goalFund, bool all) external view returns (GoalFundDetails[] memory);
        function getSingleGoalFundDetails(address goalFund) external view returns (GoalFundDetails memory);
        function getGoalFunds() external view returns (address[] memory);
        function createGoalFund(
            string name,
            string description,
            uint256 targetAmount,
            uint256 deadline,
            address beneficiary,
            uint8 paymentMethod,
            address tokenAddress,
            uint8 fundType
        ) external returns (address);
    }

    interface IGoalFund {
        function goal() external view returns (
            string name,
            string description,
            uint256 targetAmount,
            uint256 currentAmount,
            uint256 deadline,
            bool achieved,
            bool fundsWithdrawn
        );
        function contributions(address contributor) external view returns (uint256);
        function getBalance() external view returns (uint256);
        function getContributorCount() external view returns (uint256);
        function getTags() external view returns (string[] memory);
        function owner() external view returns (address);

        function contribute(uint256 amount) external payable;
        function withdrawFunds() external;
        function refundContributors() external;
        function emergencyWithdraw() external;
        function transferOwnership(address newOwner) external;
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
